use std::fmt::Debug;
use std::thread::sleep;
use std::time::Duration;

/// Blocking delay source used for the hold times of the bus protocols.
pub trait Delay: Debug {
    /// Blocks for at least the given amount of microseconds.
    fn delay_us(&self, micros: u32);

    /// Blocks for at least the given amount of milliseconds.
    fn delay_ms(&self, millis: u32) {
        self.delay_us(millis.saturating_mul(1000));
    }
}

/// Delay backed by [std::thread::sleep].
#[derive(Copy, Clone, Debug, Default)]
pub struct SleepDelay;

impl Delay for SleepDelay {
    fn delay_us(&self, micros: u32) {
        sleep(Duration::from_micros(micros as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Instant;

    #[derive(Debug, Default)]
    struct Counting(Cell<u32>);

    impl Delay for Counting {
        fn delay_us(&self, micros: u32) {
            self.0.set(self.0.get() + micros);
        }
    }

    #[test]
    fn millis_are_forwarded_as_micros() {
        let delay = Counting::default();
        delay.delay_ms(3);
        assert_eq!(delay.0.get(), 3000);
    }

    #[test]
    fn sleep_delay_blocks() {
        let start = Instant::now();
        SleepDelay.delay_ms(2);
        assert!(start.elapsed() >= Duration::from_millis(2));
    }
}
