//! Module: keymap
//!
//! Purpose: Static translation table from CardKB status bytes to logical keys.
//!
//! Architecture:
//! - [`CARDKB_ENTRIES`]: the source table, one entry per ASCII-ish code the
//!   controller reports (lowercase, uppercase, symbols, arrows).
//! - [`Keymap`]: dense 256-slot array indexed by the raw byte, built and
//!   validated at compile time for the built-in table.
//! - Raw code `0x00` is the "no key" sentinel and never appears in a table.
//!
//! Safety: Safe. No unsafe blocks. Read-only after construction.

/// Raw code reported when no key is pressed.
pub const RAW_RELEASE: u8 = 0x00;

/// Linux input code of the left shift key, used for the synthetic modifier.
pub const LINUX_KEY_LEFTSHIFT: u16 = 42;

/// Logical key identity, independent of the raw encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogicalKey {
    Esc,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,
    Num0,
    Minus,
    Equal,
    Backspace,
    Tab,
    Q,
    W,
    E,
    R,
    T,
    Y,
    U,
    I,
    O,
    P,
    LeftBrace,
    RightBrace,
    Enter,
    A,
    S,
    D,
    F,
    G,
    H,
    J,
    K,
    L,
    Semicolon,
    Apostrophe,
    Grave,
    Backslash,
    Z,
    X,
    C,
    V,
    B,
    N,
    M,
    Comma,
    Dot,
    Slash,
    Space,
    Up,
    Left,
    Right,
    Down,
}

impl LogicalKey {
    /// Every logical key, in declaration order.
    pub const ALL: [LogicalKey; 56] = [
        LogicalKey::Esc,
        LogicalKey::Num1,
        LogicalKey::Num2,
        LogicalKey::Num3,
        LogicalKey::Num4,
        LogicalKey::Num5,
        LogicalKey::Num6,
        LogicalKey::Num7,
        LogicalKey::Num8,
        LogicalKey::Num9,
        LogicalKey::Num0,
        LogicalKey::Minus,
        LogicalKey::Equal,
        LogicalKey::Backspace,
        LogicalKey::Tab,
        LogicalKey::Q,
        LogicalKey::W,
        LogicalKey::E,
        LogicalKey::R,
        LogicalKey::T,
        LogicalKey::Y,
        LogicalKey::U,
        LogicalKey::I,
        LogicalKey::O,
        LogicalKey::P,
        LogicalKey::LeftBrace,
        LogicalKey::RightBrace,
        LogicalKey::Enter,
        LogicalKey::A,
        LogicalKey::S,
        LogicalKey::D,
        LogicalKey::F,
        LogicalKey::G,
        LogicalKey::H,
        LogicalKey::J,
        LogicalKey::K,
        LogicalKey::L,
        LogicalKey::Semicolon,
        LogicalKey::Apostrophe,
        LogicalKey::Grave,
        LogicalKey::Backslash,
        LogicalKey::Z,
        LogicalKey::X,
        LogicalKey::C,
        LogicalKey::V,
        LogicalKey::B,
        LogicalKey::N,
        LogicalKey::M,
        LogicalKey::Comma,
        LogicalKey::Dot,
        LogicalKey::Slash,
        LogicalKey::Space,
        LogicalKey::Up,
        LogicalKey::Left,
        LogicalKey::Right,
        LogicalKey::Down,
    ];

    /// Position of this key in [`LogicalKey::ALL`].
    #[inline]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Linux evdev `KEY_*` code for this key.
    pub const fn linux_code(self) -> u16 {
        match self {
            LogicalKey::Esc => 1,
            LogicalKey::Num1 => 2,
            LogicalKey::Num2 => 3,
            LogicalKey::Num3 => 4,
            LogicalKey::Num4 => 5,
            LogicalKey::Num5 => 6,
            LogicalKey::Num6 => 7,
            LogicalKey::Num7 => 8,
            LogicalKey::Num8 => 9,
            LogicalKey::Num9 => 10,
            LogicalKey::Num0 => 11,
            LogicalKey::Minus => 12,
            LogicalKey::Equal => 13,
            LogicalKey::Backspace => 14,
            LogicalKey::Tab => 15,
            LogicalKey::Q => 16,
            LogicalKey::W => 17,
            LogicalKey::E => 18,
            LogicalKey::R => 19,
            LogicalKey::T => 20,
            LogicalKey::Y => 21,
            LogicalKey::U => 22,
            LogicalKey::I => 23,
            LogicalKey::O => 24,
            LogicalKey::P => 25,
            LogicalKey::LeftBrace => 26,
            LogicalKey::RightBrace => 27,
            LogicalKey::Enter => 28,
            LogicalKey::A => 30,
            LogicalKey::S => 31,
            LogicalKey::D => 32,
            LogicalKey::F => 33,
            LogicalKey::G => 34,
            LogicalKey::H => 35,
            LogicalKey::J => 36,
            LogicalKey::K => 37,
            LogicalKey::L => 38,
            LogicalKey::Semicolon => 39,
            LogicalKey::Apostrophe => 40,
            LogicalKey::Grave => 41,
            LogicalKey::Backslash => 43,
            LogicalKey::Z => 44,
            LogicalKey::X => 45,
            LogicalKey::C => 46,
            LogicalKey::V => 47,
            LogicalKey::B => 48,
            LogicalKey::N => 49,
            LogicalKey::M => 50,
            LogicalKey::Comma => 51,
            LogicalKey::Dot => 52,
            LogicalKey::Slash => 53,
            LogicalKey::Space => 57,
            LogicalKey::Up => 103,
            LogicalKey::Left => 105,
            LogicalKey::Right => 106,
            LogicalKey::Down => 108,
        }
    }

    /// Character produced by this key on a US layout, or `None` for
    /// keys with no printable or control character (arrows).
    pub fn to_char(self, shift: bool) -> Option<char> {
        let (plain, shifted) = match self {
            LogicalKey::Esc => ('\u{1b}', '\u{1b}'),
            LogicalKey::Num1 => ('1', '!'),
            LogicalKey::Num2 => ('2', '@'),
            LogicalKey::Num3 => ('3', '#'),
            LogicalKey::Num4 => ('4', '$'),
            LogicalKey::Num5 => ('5', '%'),
            LogicalKey::Num6 => ('6', '^'),
            LogicalKey::Num7 => ('7', '&'),
            LogicalKey::Num8 => ('8', '*'),
            LogicalKey::Num9 => ('9', '('),
            LogicalKey::Num0 => ('0', ')'),
            LogicalKey::Minus => ('-', '_'),
            LogicalKey::Equal => ('=', '+'),
            LogicalKey::Backspace => ('\u{8}', '\u{8}'),
            LogicalKey::Tab => ('\t', '\t'),
            LogicalKey::LeftBrace => ('[', '{'),
            LogicalKey::RightBrace => (']', '}'),
            LogicalKey::Enter => ('\n', '\n'),
            LogicalKey::Semicolon => (';', ':'),
            LogicalKey::Apostrophe => ('\'', '"'),
            LogicalKey::Grave => ('`', '~'),
            LogicalKey::Backslash => ('\\', '|'),
            LogicalKey::Comma => (',', '<'),
            LogicalKey::Dot => ('.', '>'),
            LogicalKey::Slash => ('/', '?'),
            LogicalKey::Space => (' ', ' '),
            LogicalKey::Up | LogicalKey::Left | LogicalKey::Right | LogicalKey::Down => {
                return None
            }
            letter => {
                let c = letter.letter()?;
                (c.to_ascii_lowercase(), c)
            }
        };
        Some(if shift { shifted } else { plain })
    }

    fn letter(self) -> Option<char> {
        let c = match self {
            LogicalKey::A => 'A',
            LogicalKey::B => 'B',
            LogicalKey::C => 'C',
            LogicalKey::D => 'D',
            LogicalKey::E => 'E',
            LogicalKey::F => 'F',
            LogicalKey::G => 'G',
            LogicalKey::H => 'H',
            LogicalKey::I => 'I',
            LogicalKey::J => 'J',
            LogicalKey::K => 'K',
            LogicalKey::L => 'L',
            LogicalKey::M => 'M',
            LogicalKey::N => 'N',
            LogicalKey::O => 'O',
            LogicalKey::P => 'P',
            LogicalKey::Q => 'Q',
            LogicalKey::R => 'R',
            LogicalKey::S => 'S',
            LogicalKey::T => 'T',
            LogicalKey::U => 'U',
            LogicalKey::V => 'V',
            LogicalKey::W => 'W',
            LogicalKey::X => 'X',
            LogicalKey::Y => 'Y',
            LogicalKey::Z => 'Z',
            _ => return None,
        };
        Some(c)
    }
}

/// One row of a keymap table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeymapEntry {
    /// Byte read from the controller.
    pub raw_code: u8,
    /// Logical key reported for this byte.
    pub key: LogicalKey,
    /// Report a synthetic shift together with the key.
    pub shift_required: bool,
}

impl KeymapEntry {
    pub const fn new(raw_code: u8, key: LogicalKey, shift_required: bool) -> Self {
        Self { raw_code, key, shift_required }
    }
}

const fn plain(raw_code: u8, key: LogicalKey) -> KeymapEntry {
    KeymapEntry::new(raw_code, key, false)
}

const fn shifted(raw_code: u8, key: LogicalKey) -> KeymapEntry {
    KeymapEntry::new(raw_code, key, true)
}

/// CardKB code table.
///
/// Uppercase letters and shifted symbols share a logical key with their
/// unshifted form and differ only in `shift_required`.
pub const CARDKB_ENTRIES: [KeymapEntry; 103] = {
    use LogicalKey::*;
    [
        // Control keys
        plain(0x1B, Esc),
        plain(0x08, Backspace),
        plain(0x09, Tab),
        plain(0x0D, Enter),
        plain(0x20, Space),
        // Arrows
        plain(0xB4, Left),
        plain(0xB5, Up),
        plain(0xB6, Down),
        plain(0xB7, Right),
        // Digits
        plain(0x30, Num0),
        plain(0x31, Num1),
        plain(0x32, Num2),
        plain(0x33, Num3),
        plain(0x34, Num4),
        plain(0x35, Num5),
        plain(0x36, Num6),
        plain(0x37, Num7),
        plain(0x38, Num8),
        plain(0x39, Num9),
        // Lowercase letters
        plain(0x61, A),
        plain(0x62, B),
        plain(0x63, C),
        plain(0x64, D),
        plain(0x65, E),
        plain(0x66, F),
        plain(0x67, G),
        plain(0x68, H),
        plain(0x69, I),
        plain(0x6A, J),
        plain(0x6B, K),
        plain(0x6C, L),
        plain(0x6D, M),
        plain(0x6E, N),
        plain(0x6F, O),
        plain(0x70, P),
        plain(0x71, Q),
        plain(0x72, R),
        plain(0x73, S),
        plain(0x74, T),
        plain(0x75, U),
        plain(0x76, V),
        plain(0x77, W),
        plain(0x78, X),
        plain(0x79, Y),
        plain(0x7A, Z),
        // Uppercase letters
        shifted(0x41, A),
        shifted(0x42, B),
        shifted(0x43, C),
        shifted(0x44, D),
        shifted(0x45, E),
        shifted(0x46, F),
        shifted(0x47, G),
        shifted(0x48, H),
        shifted(0x49, I),
        shifted(0x4A, J),
        shifted(0x4B, K),
        shifted(0x4C, L),
        shifted(0x4D, M),
        shifted(0x4E, N),
        shifted(0x4F, O),
        shifted(0x50, P),
        shifted(0x51, Q),
        shifted(0x52, R),
        shifted(0x53, S),
        shifted(0x54, T),
        shifted(0x55, U),
        shifted(0x56, V),
        shifted(0x57, W),
        shifted(0x58, X),
        shifted(0x59, Y),
        shifted(0x5A, Z),
        // Shifted digits
        shifted(0x21, Num1), // !
        shifted(0x40, Num2), // @
        shifted(0x23, Num3), // #
        shifted(0x24, Num4), // $
        shifted(0x25, Num5), // %
        shifted(0x5E, Num6), // ^
        shifted(0x26, Num7), // &
        shifted(0x2A, Num8), // *
        shifted(0x28, Num9), // (
        shifted(0x29, Num0), // )
        // Punctuation
        plain(0x5B, LeftBrace),
        shifted(0x7B, LeftBrace), // {
        plain(0x5D, RightBrace),
        shifted(0x7D, RightBrace), // }
        plain(0x2F, Slash),
        shifted(0x3F, Slash), // ?
        plain(0x5C, Backslash),
        shifted(0x7C, Backslash), // |
        plain(0x60, Grave),
        shifted(0x7E, Grave), // ~
        plain(0x27, Apostrophe),
        shifted(0x22, Apostrophe), // "
        plain(0x3B, Semicolon),
        shifted(0x3A, Semicolon), // :
        plain(0x3D, Equal),
        shifted(0x2B, Equal), // +
        // The stock CardKB driver has these two flags swapped ('-' shifted,
        // '_' plain). Keep the US-layout reading.
        plain(0x2D, Minus),
        shifted(0x5F, Minus), // _
        plain(0x2C, Comma),
        shifted(0x3C, Comma), // <
        plain(0x2E, Dot),
        shifted(0x3E, Dot), // >
    ]
};

/// Built-in CardKB keymap, validated at compile time.
pub static CARDKB_KEYMAP: Keymap = match Keymap::new(&CARDKB_ENTRIES) {
    Ok(keymap) => keymap,
    Err(_) => panic!("CardKB keymap contains an invalid raw code"),
};

/// Keymap construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeymapError {
    /// An entry uses the reserved `0x00` release code.
    ReservedCode,
    /// Two entries share the same raw code.
    DuplicateCode(u8),
}

impl KeymapError {
    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::ReservedCode => "raw code 0x00 is reserved for key release",
            Self::DuplicateCode(_) => "duplicate raw code",
        }
    }
}

impl core::fmt::Display for KeymapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DuplicateCode(code) => write!(f, "{}: 0x{:02X}", self.message(), code),
            Self::ReservedCode => f.write_str(self.message()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    key: LogicalKey,
    shift: bool,
}

/// Dense raw-code lookup table.
///
/// Indexed directly by the raw byte, so lookup is a single array access.
#[derive(Clone, Debug)]
pub struct Keymap {
    slots: [Option<Slot>; 256],
}

impl Keymap {
    /// Build a keymap from a table of entries.
    ///
    /// Fails on the reserved `0x00` code or a repeated raw code.
    pub const fn new(entries: &[KeymapEntry]) -> Result<Self, KeymapError> {
        let mut slots: [Option<Slot>; 256] = [None; 256];
        let mut i = 0;
        while i < entries.len() {
            let entry = entries[i];
            if entry.raw_code == RAW_RELEASE {
                return Err(KeymapError::ReservedCode);
            }
            if slots[entry.raw_code as usize].is_some() {
                return Err(KeymapError::DuplicateCode(entry.raw_code));
            }
            slots[entry.raw_code as usize] = Some(Slot {
                key: entry.key,
                shift: entry.shift_required,
            });
            i += 1;
        }
        Ok(Self { slots })
    }

    /// Look up a raw code.
    ///
    /// Returns the logical key and whether it needs a synthetic shift.
    /// `0x00` and unmapped codes return `None`.
    #[inline]
    pub fn lookup(&self, raw: u8) -> Option<(LogicalKey, bool)> {
        self.slots[raw as usize].map(|slot| (slot.key, slot.shift))
    }

    /// Number of mapped raw codes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if no raw code is mapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys this map can produce, for registration with the event sink.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities {
            keys: KeySet::new(),
            shift: false,
            autorepeat: true,
        };
        for slot in self.slots.iter().flatten() {
            caps.keys.insert(slot.key);
            caps.shift |= slot.shift;
        }
        caps
    }
}

/// Set of logical keys (bitset over [`LogicalKey::index`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeySet(u64);

impl KeySet {
    pub const fn new() -> Self {
        Self(0)
    }

    #[inline]
    pub fn insert(&mut self, key: LogicalKey) {
        self.0 |= 1u64 << key.index();
    }

    #[inline]
    pub fn contains(&self, key: LogicalKey) -> bool {
        self.0 & (1u64 << key.index()) != 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate contained keys in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = LogicalKey> + '_ {
        LogicalKey::ALL.iter().copied().filter(move |k| self.contains(*k))
    }
}

/// Key capabilities declared to the event sink before first use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Every logical key the keymap can report.
    pub keys: KeySet,
    /// True if any entry requires the synthetic shift.
    pub shift: bool,
    /// Sink may generate autorepeat for held keys.
    pub autorepeat: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_uppercase_share_key() {
        assert_eq!(CARDKB_KEYMAP.lookup(b'a'), Some((LogicalKey::A, false)));
        assert_eq!(CARDKB_KEYMAP.lookup(b'A'), Some((LogicalKey::A, true)));
        assert_eq!(CARDKB_KEYMAP.lookup(b'z'), Some((LogicalKey::Z, false)));
        assert_eq!(CARDKB_KEYMAP.lookup(b'Z'), Some((LogicalKey::Z, true)));
    }

    #[test]
    fn test_release_code_is_unmapped() {
        assert_eq!(CARDKB_KEYMAP.lookup(RAW_RELEASE), None);
    }

    #[test]
    fn test_arrows() {
        assert_eq!(CARDKB_KEYMAP.lookup(0xB4), Some((LogicalKey::Left, false)));
        assert_eq!(CARDKB_KEYMAP.lookup(0xB5), Some((LogicalKey::Up, false)));
        assert_eq!(CARDKB_KEYMAP.lookup(0xB6), Some((LogicalKey::Down, false)));
        assert_eq!(CARDKB_KEYMAP.lookup(0xB7), Some((LogicalKey::Right, false)));
    }

    #[test]
    fn test_unmapped_codes() {
        // Fn layer codes and the old Ctrl+C chord are not mapped
        assert_eq!(CARDKB_KEYMAP.lookup(0xA8), None);
        assert_eq!(CARDKB_KEYMAP.lookup(0x80), None);
        assert_eq!(CARDKB_KEYMAP.lookup(0xFF), None);
    }

    #[test]
    fn test_minus_plain_underscore_shifted() {
        assert_eq!(CARDKB_KEYMAP.lookup(b'-'), Some((LogicalKey::Minus, false)));
        assert_eq!(CARDKB_KEYMAP.lookup(b'_'), Some((LogicalKey::Minus, true)));
        assert_eq!(LogicalKey::Minus.to_char(false), Some('-'));
        assert_eq!(LogicalKey::Minus.to_char(true), Some('_'));
    }

    #[test]
    fn test_builtin_table_size() {
        assert_eq!(CARDKB_KEYMAP.len(), CARDKB_ENTRIES.len());
    }

    #[test]
    fn test_every_entry_resolves_to_itself() {
        for entry in CARDKB_ENTRIES.iter() {
            assert_eq!(
                CARDKB_KEYMAP.lookup(entry.raw_code),
                Some((entry.key, entry.shift_required)),
                "raw 0x{:02X}",
                entry.raw_code
            );
        }
    }

    #[test]
    fn test_entry_chars_match_raw_ascii() {
        // Every printable entry should render back to its own ASCII byte
        for entry in CARDKB_ENTRIES.iter() {
            if let Some(c) = entry.key.to_char(entry.shift_required) {
                if entry.raw_code.is_ascii() {
                    let expected = match entry.raw_code {
                        0x0D => '\n',
                        other => other as char,
                    };
                    assert_eq!(c, expected, "raw 0x{:02X}", entry.raw_code);
                }
            }
        }
    }

    #[test]
    fn test_rejects_reserved_code() {
        let entries = [plain(0x00, LogicalKey::A)];
        assert_eq!(Keymap::new(&entries).unwrap_err(), KeymapError::ReservedCode);
    }

    #[test]
    fn test_rejects_duplicate_code() {
        let entries = [plain(0x61, LogicalKey::A), shifted(0x61, LogicalKey::B)];
        assert_eq!(
            Keymap::new(&entries).unwrap_err(),
            KeymapError::DuplicateCode(0x61)
        );
    }

    #[test]
    fn test_capabilities() {
        let caps = CARDKB_KEYMAP.capabilities();
        assert!(caps.shift);
        assert!(caps.autorepeat);
        assert_eq!(caps.keys.len(), LogicalKey::ALL.len());
        assert!(caps.keys.contains(LogicalKey::Esc));
        assert!(caps.keys.contains(LogicalKey::Down));

        let unshifted = Keymap::new(&[plain(0x61, LogicalKey::A)]).unwrap();
        let caps = unshifted.capabilities();
        assert!(!caps.shift);
        assert_eq!(caps.keys.iter().collect::<Vec<_>>(), vec![LogicalKey::A]);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, key) in LogicalKey::ALL.iter().enumerate() {
            assert_eq!(key.index() as usize, i);
        }
    }

    #[test]
    fn test_linux_codes() {
        assert_eq!(LogicalKey::Esc.linux_code(), 1);
        assert_eq!(LogicalKey::A.linux_code(), 30);
        assert_eq!(LogicalKey::Space.linux_code(), 57);
        assert_eq!(LogicalKey::Down.linux_code(), 108);
        assert_ne!(LogicalKey::Backslash.linux_code(), LINUX_KEY_LEFTSHIFT);
    }
}
