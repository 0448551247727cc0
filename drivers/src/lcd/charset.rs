//! Character ROM A00 of the HD44780 (Japanese standard font).
//!
//! Codes 0x20..=0x7D are ASCII with two exceptions: 0x5C is `¥` instead of a backslash, and
//! 0x7E/0x7F are arrows. The upper half holds katakana and a few Latin and Greek letters, which
//! is where the umlauts and the degree sign come from.

/// Non-ASCII characters available in ROM A00.
const EXTRA: [(char, u8); 12] = [
    ('¥', 0x5C),
    ('→', 0x7E),
    ('←', 0x7F),
    ('°', 0xDF),
    ('α', 0xE0),
    ('ä', 0xE1),
    ('ß', 0xE2),
    ('ε', 0xE3),
    ('µ', 0xE4),
    ('ö', 0xEF),
    ('Ω', 0xF4),
    ('ü', 0xF5),
];

/// Gets the ROM code of a character, if the display can show it.
pub fn encode(c: char) -> Option<u8> {
    match c {
        '\\' => None,
        ' '..='}' => Some(c as u8),
        _ => EXTRA.iter().find(|(extra, _)| *extra == c).map(|&(_, code)| code),
    }
}

/// Gets the character shown for a ROM code.
///
/// CGRAM codes and unmapped glyphs come back as `None`.
pub fn decode(code: u8) -> Option<char> {
    match code {
        0x5C => Some('¥'),
        0x20..=0x7D => Some(code as char),
        _ => EXTRA.iter().find(|(_, extra)| *extra == code).map(|&(c, _)| c),
    }
}
