//! macOS virtual key codes (CGKeyCode) and their case-insensitive symbols.
//!
//! Key codes are physical key positions per Apple HIToolbox/Events.h and
//! assume an ANSI layout. The symbol table covers digits, letters, space and
//! a handful of punctuation keys; letters map to their lower-case form and
//! case has to be derived from modifier state by the caller.
//!
//! Keys without a textual symbol (arrows, modifiers, return, escape, tab,
//! backspace) are recognised by code through the named constants below.

pub const KEYCODE_SPACE: u16 = 0x31;
pub const KEYCODE_RETURN: u16 = 0x24;
pub const KEYCODE_ESCAPE: u16 = 0x35;
pub const KEYCODE_TAB: u16 = 0x30;
/// kVK_Delete, the key labelled Backspace on PC keyboards.
pub const KEYCODE_BACK: u16 = 0x33;

pub const KEYCODE_LEFT: u16 = 0x7B;
pub const KEYCODE_RIGHT: u16 = 0x7C;
pub const KEYCODE_DOWN: u16 = 0x7D;
pub const KEYCODE_UP: u16 = 0x7E;

pub const KEYCODE_CAPITAL: u16 = 0x39;
pub const KEYCODE_LSHIFT: u16 = 0x38;
pub const KEYCODE_RSHIFT: u16 = 0x3C;
pub const KEYCODE_LCONTROL: u16 = 0x3B;
pub const KEYCODE_RCONTROL: u16 = 0x3E;
/// Left Command key.
pub const KEYCODE_LWIN: u16 = 0x37;
/// Right Command key.
pub const KEYCODE_RWIN: u16 = 0x36;

/// Returns the case-insensitive symbol typed by `code`, if it has one.
pub fn symbol_for(code: u16) -> Option<char> {
    match code {
        // Top-row digits
        0x1D => Some('0'),
        0x12 => Some('1'),
        0x13 => Some('2'),
        0x14 => Some('3'),
        0x15 => Some('4'),
        0x17 => Some('5'),
        0x16 => Some('6'),
        0x1A => Some('7'),
        0x1C => Some('8'),
        0x19 => Some('9'),

        KEYCODE_SPACE => Some(' '),

        // Letters
        0x00 => Some('a'),
        0x0B => Some('b'),
        0x08 => Some('c'),
        0x02 => Some('d'),
        0x0E => Some('e'),
        0x03 => Some('f'),
        0x05 => Some('g'),
        0x04 => Some('h'),
        0x22 => Some('i'),
        0x26 => Some('j'),
        0x28 => Some('k'),
        0x25 => Some('l'),
        0x2E => Some('m'),
        0x2D => Some('n'),
        0x1F => Some('o'),
        0x23 => Some('p'),
        0x0C => Some('q'),
        0x0F => Some('r'),
        0x01 => Some('s'),
        0x11 => Some('t'),
        0x20 => Some('u'),
        0x09 => Some('v'),
        0x0D => Some('w'),
        0x07 => Some('x'),
        0x10 => Some('y'),
        0x06 => Some('z'),

        // Punctuation, named by the symbol the launcher reads from them.
        0x2C => Some('?'),
        0x2A => Some('\\'),
        0x2F => Some('.'),
        0x29 => Some(':'),
        0x18 => Some('+'),
        0x1B => Some('-'),

        _ => None,
    }
}

/// Returns the key code that types `symbol`, ignoring letter case.
pub fn keycode_for(symbol: char) -> Option<u16> {
    match symbol.to_ascii_lowercase() {
        '0' => Some(0x1D),
        '1' => Some(0x12),
        '2' => Some(0x13),
        '3' => Some(0x14),
        '4' => Some(0x15),
        '5' => Some(0x17),
        '6' => Some(0x16),
        '7' => Some(0x1A),
        '8' => Some(0x1C),
        '9' => Some(0x19),

        ' ' => Some(KEYCODE_SPACE),

        'a' => Some(0x00),
        'b' => Some(0x0B),
        'c' => Some(0x08),
        'd' => Some(0x02),
        'e' => Some(0x0E),
        'f' => Some(0x03),
        'g' => Some(0x05),
        'h' => Some(0x04),
        'i' => Some(0x22),
        'j' => Some(0x26),
        'k' => Some(0x28),
        'l' => Some(0x25),
        'm' => Some(0x2E),
        'n' => Some(0x2D),
        'o' => Some(0x1F),
        'p' => Some(0x23),
        'q' => Some(0x0C),
        'r' => Some(0x0F),
        's' => Some(0x01),
        't' => Some(0x11),
        'u' => Some(0x20),
        'v' => Some(0x09),
        'w' => Some(0x0D),
        'x' => Some(0x07),
        'y' => Some(0x10),
        'z' => Some(0x06),

        '?' => Some(0x2C),
        '\\' => Some(0x2A),
        '.' => Some(0x2F),
        ':' => Some(0x29),
        '+' => Some(0x18),
        '-' => Some(0x1B),

        _ => None,
    }
}

/// True for the modifier keys, including caps lock.
pub fn is_modifier(code: u16) -> bool {
    matches!(
        code,
        KEYCODE_CAPITAL
            | KEYCODE_LSHIFT
            | KEYCODE_RSHIFT
            | KEYCODE_LCONTROL
            | KEYCODE_RCONTROL
            | KEYCODE_LWIN
            | KEYCODE_RWIN
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(u16, char)] = &[
        (29, '0'),
        (18, '1'),
        (19, '2'),
        (20, '3'),
        (21, '4'),
        (23, '5'),
        (22, '6'),
        (26, '7'),
        (28, '8'),
        (25, '9'),
        (49, ' '),
        (0, 'a'),
        (11, 'b'),
        (8, 'c'),
        (2, 'd'),
        (14, 'e'),
        (3, 'f'),
        (5, 'g'),
        (4, 'h'),
        (34, 'i'),
        (38, 'j'),
        (40, 'k'),
        (37, 'l'),
        (46, 'm'),
        (45, 'n'),
        (31, 'o'),
        (35, 'p'),
        (12, 'q'),
        (15, 'r'),
        (1, 's'),
        (17, 't'),
        (32, 'u'),
        (9, 'v'),
        (13, 'w'),
        (7, 'x'),
        (16, 'y'),
        (6, 'z'),
        (44, '?'),
        (42, '\\'),
        (47, '.'),
        (41, ':'),
        (24, '+'),
        (27, '-'),
    ];

    #[test]
    fn every_table_code_has_its_symbol() {
        for &(code, symbol) in TABLE {
            assert_eq!(symbol_for(code), Some(symbol), "code {code}");
        }
    }

    #[test]
    fn each_symbol_is_produced_by_exactly_one_code() {
        for &(_, symbol) in TABLE {
            let producers = (0..=u16::from(u8::MAX))
                .filter(|&code| symbol_for(code) == Some(symbol))
                .count();
            assert_eq!(producers, 1, "symbol {symbol:?}");
        }
    }

    #[test]
    fn reverse_lookup_is_case_insensitive() {
        for &(code, symbol) in TABLE {
            assert_eq!(keycode_for(symbol), Some(code));
            assert_eq!(keycode_for(symbol.to_ascii_uppercase()), Some(code));
        }
    }

    #[test]
    fn named_keys_have_no_symbol() {
        for code in [
            KEYCODE_RETURN,
            KEYCODE_ESCAPE,
            KEYCODE_TAB,
            KEYCODE_BACK,
            KEYCODE_LEFT,
            KEYCODE_RIGHT,
            KEYCODE_UP,
            KEYCODE_DOWN,
            KEYCODE_CAPITAL,
            KEYCODE_LSHIFT,
            KEYCODE_RWIN,
        ] {
            assert_eq!(symbol_for(code), None, "code {code:#04x}");
        }
    }

    #[test]
    fn unknown_codes_report_no_symbol() {
        assert_eq!(symbol_for(0xFF), None);
        assert_eq!(symbol_for(u16::MAX), None);
        assert_eq!(keycode_for('!'), None);
        assert_eq!(keycode_for('é'), None);
    }

    #[test]
    fn modifiers_are_classified() {
        assert!(is_modifier(KEYCODE_LSHIFT));
        assert!(is_modifier(KEYCODE_CAPITAL));
        assert!(!is_modifier(KEYCODE_SPACE));
        assert!(!is_modifier(KEYCODE_RETURN));
    }
}
