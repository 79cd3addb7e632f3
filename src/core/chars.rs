//! XML 1.0 Character Classes
//!
//! Predicates over decoded code points, used by the lexer for every
//! character it consumes. ASCII is answered from a lookup table; the
//! remaining ranges follow the XML 1.0 (fifth edition) productions.

const VALID: u8 = 1;
const NAME_START: u8 = 1 << 1;
const NAME: u8 = 1 << 2;
const CONTENT: u8 = 1 << 3;
const SPACE: u8 = 1 << 4;

static ASCII_CLASS: [u8; 128] = build_ascii_table();

const fn build_ascii_table() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut c = 0usize;
    while c < 128 {
        let b = c as u8;
        let mut class = 0u8;
        if b == b'\t' || b == b'\n' || b == b'\r' || b >= 0x20 {
            class |= VALID;
            if b != b'<' && b != b'&' && b != b']' {
                class |= CONTENT;
            }
        }
        if b == b' ' || b == b'\t' || b == b'\n' || b == b'\r' {
            class |= SPACE;
        }
        if b.is_ascii_alphabetic() || b == b'_' || b == b':' {
            class |= NAME_START | NAME;
        }
        if b.is_ascii_digit() || b == b'-' || b == b'.' {
            class |= NAME;
        }
        table[c] = class;
        c += 1;
    }
    table
}

#[inline]
fn ascii_has(c: u32, class: u8) -> bool {
    ASCII_CLASS[c as usize] & class != 0
}

/// `Char` production: any Unicode character excluding surrogates,
/// U+FFFE/U+FFFF and most C0 controls
#[inline]
pub fn is_valid_char(c: u32) -> bool {
    if c < 0x80 {
        return ascii_has(c, VALID);
    }
    matches!(c, 0x80..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

/// Valid character allowed in text without escaping (not `<`, `&`, `]`)
#[inline]
pub fn is_content_char(c: u32) -> bool {
    if c < 0x80 {
        return ascii_has(c, CONTENT);
    }
    is_valid_char(c)
}

#[inline]
pub fn is_space_char(c: u32) -> bool {
    c < 0x80 && ascii_has(c, SPACE)
}

#[inline]
pub fn is_name_start_char(c: u32) -> bool {
    if c < 0x80 {
        return ascii_has(c, NAME_START);
    }
    matches!(
        c,
        0xC0..=0xD6
            | 0xD8..=0xF6
            | 0xF8..=0x2FF
            | 0x370..=0x37D
            | 0x37F..=0x1FFF
            | 0x200C..=0x200D
            | 0x2070..=0x218F
            | 0x2C00..=0x2FEF
            | 0x3001..=0xD7FF
            | 0xF900..=0xFDCF
            | 0xFDF0..=0xFFFD
            | 0x10000..=0xEFFFF
    )
}

#[inline]
pub fn is_name_char(c: u32) -> bool {
    if c < 0x80 {
        return ascii_has(c, NAME);
    }
    is_name_start_char(c) || c == 0xB7 || matches!(c, 0x300..=0x36F | 0x203F..=0x2040)
}
