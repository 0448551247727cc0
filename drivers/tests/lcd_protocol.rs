use avrlab_drivers::lcd::hd44780::driver::{
    BusWidth, BusyStrategy, CursorDirection, DisplaySettings, HD44780Driver, HD44780Ext, LcdPins,
    ParallelHD44780Driver,
};
use avrlab_drivers::poll::PollPolicy;
use avrlab_drivers::regs::PIND;
use avrlab_drivers::sim::{Access, BusyModel, LcdEvent, SimHd44780, SimRegisterFile};
use avrlab_drivers::HwError;
use std::cell::RefCell;
use std::rc::Rc;

fn attach_display(
    registers: &SimRegisterFile,
    pins: LcdPins,
    width: BusWidth,
    model: BusyModel,
) -> Rc<RefCell<SimHd44780>> {
    let display = Rc::new(RefCell::new(
        SimHd44780::new(pins, width).with_busy_model(model),
    ));
    registers.attach(display.clone());
    display
}

fn without_nibbles(events: &[LcdEvent]) -> Vec<LcdEvent> {
    events
        .iter()
        .copied()
        .filter(|event| !matches!(event, LcdEvent::Nibble(_)))
        .collect()
}

#[test]
fn busy_flag_is_polled_until_clear() {
    let registers = SimRegisterFile::new();
    let display = attach_display(
        &registers,
        LcdPins::default(),
        BusWidth::EightBit,
        BusyModel::Polls(3),
    );
    let mut lcd =
        ParallelHD44780Driver::new_8bit(&registers, &registers, LcdPins::default()).unwrap();
    lcd.configure_ports().unwrap();
    lcd.initialize_display().unwrap();
    display.borrow_mut().clear_events();
    registers.clear_log();

    lcd.write_data(b'A').unwrap();

    assert_eq!(
        display.borrow().events(),
        &[
            LcdEvent::Data(b'A'),
            LcdEvent::StatusRead { busy: true },
            LcdEvent::StatusRead { busy: true },
            LcdEvent::StatusRead { busy: true },
            LcdEvent::StatusRead { busy: false },
        ]
    );
    let pin_reads = registers
        .log()
        .iter()
        .filter(|access| matches!(access, Access::Read(reg, _) if *reg == PIND))
        .count();
    assert_eq!(pin_reads, 4);
    assert_eq!(display.borrow().writes_while_busy(), 0);
}

#[test]
fn stuck_busy_flag_times_out() {
    let registers = SimRegisterFile::new();
    attach_display(
        &registers,
        LcdPins::default(),
        BusWidth::EightBit,
        BusyModel::Polls(u32::MAX),
    );
    let mut lcd = ParallelHD44780Driver::new_8bit(&registers, &registers, LcdPins::default())
        .unwrap()
        .with_busy_strategy(BusyStrategy::PollBusyFlag(PollPolicy::Bounded { attempts: 20 }));
    lcd.configure_ports().unwrap();

    assert_eq!(
        lcd.write_data(b'A'),
        Err(HwError::Timeout("LCD busy flag"))
    );
}

#[test]
fn four_bit_bytes_go_out_high_nibble_first() {
    let registers = SimRegisterFile::new();
    let display = attach_display(
        &registers,
        LcdPins::sample_4bit(),
        BusWidth::FourBit,
        BusyModel::Timed,
    );
    let mut lcd =
        ParallelHD44780Driver::new_4bit(&registers, &registers, LcdPins::sample_4bit())
            .unwrap()
            .with_busy_strategy(BusyStrategy::fixed_delay());
    lcd.configure_ports().unwrap();
    lcd.initialize_display().unwrap();
    display.borrow_mut().clear_events();

    lcd.write_data(0xA5).unwrap();

    assert_eq!(
        display.borrow().events(),
        &[
            LcdEvent::Nibble(0xA),
            LcdEvent::Nibble(0x5),
            LcdEvent::Data(0xA5),
        ]
    );
    assert_eq!(display.borrow().state().ddram[0], 0xA5);

    lcd.set_ddram_address(0).unwrap();
    assert_eq!(lcd.read_data().unwrap(), 0xA5);
}

#[test]
fn four_bit_interface_reads_the_busy_flag_in_two_halves() {
    let registers = SimRegisterFile::new();
    let display = attach_display(
        &registers,
        LcdPins::sample_4bit(),
        BusWidth::FourBit,
        BusyModel::Polls(1),
    );
    let mut lcd =
        ParallelHD44780Driver::new_4bit(&registers, &registers, LcdPins::sample_4bit()).unwrap();
    lcd.configure_ports().unwrap();
    lcd.initialize_display().unwrap();
    lcd.set_ddram_address(0x05).unwrap();

    assert_eq!(lcd.busy_flag_and_address().unwrap(), (false, 0x05));
    assert!(!display.borrow().state().eight_bit);
    assert_eq!(display.borrow().writes_while_busy(), 0);
}

/// Writes two bytes with a busy flag read in between, which turns the data lines around.
fn bus_is_driven_again_after_a_status_read(pins: LcdPins, width: BusWidth) {
    let registers = SimRegisterFile::new();
    let display = attach_display(&registers, pins, width, BusyModel::Polls(2));
    let mut lcd = match width {
        BusWidth::EightBit => ParallelHD44780Driver::new_8bit(&registers, &registers, pins),
        BusWidth::FourBit => ParallelHD44780Driver::new_4bit(&registers, &registers, pins),
    }
    .unwrap();
    lcd.configure_ports().unwrap();
    lcd.initialize_display().unwrap();
    display.borrow_mut().clear_events();

    lcd.write_data(b'A').unwrap();
    lcd.write_data(b'B').unwrap();

    let mask = width.data_mask();
    assert_eq!(registers.peek(pins.data.ddr) & mask, mask);
    let display = display.borrow();
    assert_eq!(display.data_written(), b"AB");
    assert_eq!(&display.state().ddram[..2], b"AB");
    assert_eq!(display.writes_while_busy(), 0);
}

#[test]
fn eight_bit_bus_is_driven_again_after_a_status_read() {
    bus_is_driven_again_after_a_status_read(LcdPins::default(), BusWidth::EightBit);
}

#[test]
fn four_bit_bus_is_driven_again_after_a_status_read() {
    bus_is_driven_again_after_a_status_read(LcdPins::sample_4bit(), BusWidth::FourBit);
}

fn initialization_is_idempotent(pins: LcdPins, width: BusWidth) {
    let registers = SimRegisterFile::new();
    let display = attach_display(&registers, pins, width, BusyModel::Timed);
    let settings = DisplaySettings {
        two_lines: true,
        large_font: false,
        ..DisplaySettings::default()
    };
    let mut lcd = match width {
        BusWidth::EightBit => ParallelHD44780Driver::new_8bit(&registers, &registers, pins),
        BusWidth::FourBit => ParallelHD44780Driver::new_4bit(&registers, &registers, pins),
    }
    .unwrap()
    .with_settings(settings);

    lcd.configure_ports().unwrap();
    lcd.initialize_display().unwrap();
    let first = display.borrow().state().clone();

    lcd.print("garbage").unwrap();
    lcd.set_display_control(false, false, true).unwrap();
    lcd.cursor_shift(true, CursorDirection::Left).unwrap();
    lcd.initialize_display().unwrap();

    assert_eq!(display.borrow().state(), &first);
    assert_eq!(first.eight_bit, width == BusWidth::EightBit);
    assert!(first.two_lines && first.display_on && first.cursor_on);
    assert_eq!(first.address, 0);
    assert_eq!(display.borrow().writes_while_busy(), 0);
}

#[test]
fn eight_bit_initialization_is_idempotent() {
    initialization_is_idempotent(LcdPins::default(), BusWidth::EightBit);
}

#[test]
fn four_bit_initialization_is_idempotent() {
    initialization_is_idempotent(LcdPins::sample_4bit(), BusWidth::FourBit);
}

#[test]
fn text_and_number_reach_the_display() {
    let registers = SimRegisterFile::new();
    let display = attach_display(
        &registers,
        LcdPins::sample_4bit(),
        BusWidth::FourBit,
        BusyModel::Polls(1),
    );
    let mut lcd =
        ParallelHD44780Driver::new_4bit(&registers, &registers, LcdPins::sample_4bit())
            .unwrap()
            .with_settings(DisplaySettings {
                shift_on_write: false,
                ..DisplaySettings::default()
            });
    lcd.configure_ports().unwrap();
    lcd.initialize_display().unwrap();
    display.borrow_mut().clear_events();

    lcd.write_string(b"Hi\0").unwrap();
    lcd.write_number(24).unwrap();

    let mut expected = Vec::new();
    for &byte in b"Hi24" {
        expected.push(LcdEvent::Data(byte));
        expected.push(LcdEvent::StatusRead { busy: true });
        expected.push(LcdEvent::StatusRead { busy: false });
    }
    assert_eq!(without_nibbles(display.borrow().events()), expected);
    assert_eq!(display.borrow().line(0), "Hi24            ");
}

#[test]
fn print_uses_the_character_rom() {
    let registers = SimRegisterFile::new();
    let display = attach_display(
        &registers,
        LcdPins::default(),
        BusWidth::EightBit,
        BusyModel::Timed,
    );
    let mut lcd = ParallelHD44780Driver::new_8bit(&registers, &registers, LcdPins::default())
        .unwrap()
        .with_settings(DisplaySettings {
            two_lines: true,
            large_font: false,
            shift_on_write: false,
            ..DisplaySettings::default()
        });
    lcd.configure_ports().unwrap();
    lcd.initialize_display().unwrap();

    lcd.print("Lämpö").unwrap();
    lcd.set_cursor(1, 2).unwrap();
    lcd.print("-5°C").unwrap();

    assert_eq!(
        display.borrow().text(),
        "Lämpö           \n  -5°C          "
    );
}
