use crate::regs::DATA_SPACE_SIZE;
use crate::{HwError, HwResult, Register, RegisterFile};
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::path::Path;

/// Register file backed by a memory mapping of the data space.
///
/// Point it at a register image exported by an emulator, or at a device node that exposes the
/// I/O space of a real chip. All accesses are volatile.
pub struct MappedRegisterFile {
    mmap: MmapRaw,
}

impl MappedRegisterFile {
    fn create(path: &Path, offset: u64) -> HwResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        // Device nodes report no length, only a regular file can be too short.
        let metadata = file.metadata()?;
        let needed = offset + DATA_SPACE_SIZE as u64;
        if metadata.is_file() && metadata.len() < needed {
            return Err(HwError::Other(format!(
                "{} holds {} bytes, the register image needs {}",
                path.display(),
                metadata.len(),
                needed
            )));
        }

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(DATA_SPACE_SIZE)
            .map_raw(&file)?;

        Ok(MappedRegisterFile { mmap })
    }

    /// Maps the register image stored at the start of the file.
    pub fn open(path: impl AsRef<Path>) -> HwResult<Self> {
        Self::create(path.as_ref(), 0)
    }

    /// Maps the register image starting `offset` bytes into the file.
    pub fn open_at(path: impl AsRef<Path>, offset: u64) -> HwResult<Self> {
        Self::create(path.as_ref(), offset)
    }

    fn index(register: Register) -> HwResult<usize> {
        let index = register.address() as usize;
        if index >= DATA_SPACE_SIZE {
            return Err(HwError::InvalidArgument);
        }
        Ok(index)
    }
}

impl Debug for MappedRegisterFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MappedRegisterFile({:?})", self.mmap.as_ptr().addr())
    }
}

impl RegisterFile for MappedRegisterFile {
    fn read(&self, register: Register) -> HwResult<u8> {
        let index = Self::index(register)?;
        // The mapping is DATA_SPACE_SIZE bytes long and the index was bounds-checked.
        let value = unsafe { self.mmap.as_ptr().add(index).read_volatile() };
        trace!("Read {:?} = {:08b}", register, value);
        Ok(value)
    }

    fn write(&self, register: Register, value: u8) -> HwResult<()> {
        let index = Self::index(register)?;
        unsafe { self.mmap.as_mut_ptr().add(index).write_volatile(value) };
        trace!("Wrote {:?} = {:08b}", register, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{PORTB, TWBR};
    use std::fs;
    use std::path::PathBuf;

    fn register_image(name: &str, size: usize) -> PathBuf {
        let path = std::env::temp_dir().join(format!("avrlab-{}-{}.bin", name, std::process::id()));
        fs::write(&path, vec![0u8; size]).unwrap();
        path
    }

    #[test]
    fn writes_land_in_the_image() {
        let path = register_image("writes", DATA_SPACE_SIZE);
        {
            let registers = MappedRegisterFile::open(&path).unwrap();
            registers.write(TWBR, 16).unwrap();
            registers.set_bits(PORTB, 0b1000_0001).unwrap();
            assert_eq!(registers.read(TWBR).unwrap(), 16);
            assert_eq!(registers.read(PORTB).unwrap(), 0b1000_0001);
        }
        let image = fs::read(&path).unwrap();
        assert_eq!(image[TWBR.address() as usize], 16);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_registers_outside_the_data_space() {
        let path = register_image("bounds", DATA_SPACE_SIZE);
        let registers = MappedRegisterFile::open(&path).unwrap();
        assert_eq!(
            registers.read(Register(DATA_SPACE_SIZE as u16)),
            Err(HwError::InvalidArgument)
        );
        drop(registers);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_image_is_an_io_error() {
        let result = MappedRegisterFile::open("/nonexistent/avrlab/registers.bin");
        assert!(matches!(result, Err(HwError::Io(_))));
    }

    #[test]
    fn short_image_is_rejected_before_mapping() {
        let path = register_image("short", DATA_SPACE_SIZE);
        assert!(MappedRegisterFile::open_at(&path, 0).is_ok());
        let result = MappedRegisterFile::open_at(&path, 1);
        assert!(matches!(result, Err(HwError::Other(message)) if message.contains("needs")));
        fs::remove_file(path).unwrap();
    }
}
