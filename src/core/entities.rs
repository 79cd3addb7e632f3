//! Entity and Character References
//!
//! Recognizes references while the lexer consumes text and attribute values:
//! - Character references: `&#123;` and `&#x7B;`, checked against the XML
//!   `Char` production
//! - Named references: the five XML entities plus the HTML 4 set
//!
//! Nothing is decoded into the index; references are only validated. The
//! resolved forms are needed when comparing namespace URIs, which is what
//! `resolved_char_at` and friends are for.

use crate::core::chars::is_valid_char;
use crate::core::reader::CharReader;
use crate::error::{ParseError, Result};

/// Longest named entity accepted
const MAX_ENTITY_NAME: usize = 9;

/// Consume a reference whose `&` was just read and return the code point it
/// stands for.
pub fn entity_identifier(reader: &mut CharReader<'_>) -> Result<u32> {
    parse_reference(|| reader.get_char())
}

/// Reference grammar over any character source
fn parse_reference(mut next: impl FnMut() -> Result<u32>) -> Result<u32> {
    let mut c = next()?;
    if c == '#' as u32 {
        c = next()?;
        let value = if c == 'x' as u32 {
            let mut value: u32 = 0;
            loop {
                c = next()?;
                if c == ';' as u32 {
                    break;
                }
                let digit = char::from_u32(c)
                    .and_then(|ch| ch.to_digit(16))
                    .ok_or_else(|| ParseError::entity("illegal char following &#x"))?;
                value = value
                    .checked_mul(16)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(|| ParseError::entity("character reference out of range"))?;
            }
            value
        } else {
            let mut value: u32 = 0;
            while c != ';' as u32 {
                let digit = char::from_u32(c)
                    .and_then(|ch| ch.to_digit(10))
                    .ok_or_else(|| ParseError::entity("illegal char following &#"))?;
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(|| ParseError::entity("character reference out of range"))?;
                c = next()?;
            }
            value
        };
        if !is_valid_char(value) {
            return Err(ParseError::entity(format!(
                "character reference to invalid XML char #x{:X}",
                value
            )));
        }
        return Ok(value);
    }

    let mut name = [0u8; MAX_ENTITY_NAME];
    let mut len = 0;
    let mut ascii = true;
    while c != ';' as u32 {
        if len == MAX_ENTITY_NAME {
            return Err(ParseError::entity("illegal char following &"));
        }
        if c < 0x80 {
            name[len] = c as u8;
        } else {
            ascii = false;
        }
        len += 1;
        c = next()?;
    }
    let name = &name[..len];
    ascii
        .then(|| named_entity(name))
        .flatten()
        .ok_or_else(|| {
            ParseError::entity(format!("unknown entity &{};", String::from_utf8_lossy(name)))
        })
}

/// Decode the character at `offset`, resolving a reference if one starts
/// there. Returns the code point and the bytes it spans.
pub fn resolved_char_at(reader: &CharReader<'_>, offset: usize) -> Result<(u32, usize)> {
    let (c, width) = reader.char_at(offset)?;
    if c != '&' as u32 {
        return Ok((c, width));
    }
    let mut pos = offset + width;
    let value = parse_reference(|| {
        let (c, w) = reader.char_at(pos)?;
        pos += w;
        Ok(c)
    })?;
    Ok((value, pos - offset))
}

/// Compare two document ranges after reference resolution
pub fn resolved_eq(
    reader: &CharReader<'_>,
    a_offset: usize,
    a_len: usize,
    b_offset: usize,
    b_len: usize,
) -> Result<bool> {
    let (a_end, b_end) = (a_offset + a_len, b_offset + b_len);
    let (mut a, mut b) = (a_offset, b_offset);
    while a < a_end && b < b_end {
        let (ca, wa) = resolved_char_at(reader, a)?;
        let (cb, wb) = resolved_char_at(reader, b)?;
        if ca != cb {
            return Ok(false);
        }
        a += wa;
        b += wb;
    }
    Ok(a >= a_end && b >= b_end)
}

/// Compare a document range, after reference resolution, with a string
pub fn resolved_matches(reader: &CharReader<'_>, offset: usize, len: usize, expected: &str) -> Result<bool> {
    let end = offset + len;
    let mut pos = offset;
    for want in expected.chars() {
        if pos >= end {
            return Ok(false);
        }
        let (c, w) = resolved_char_at(reader, pos)?;
        if c != want as u32 {
            return Ok(false);
        }
        pos += w;
    }
    Ok(pos >= end)
}

// ============================================================================
// Named Entity Table
// ============================================================================

/// Names of U+00A0..=U+00FF, in code point order
static LATIN1: [&str; 96] = [
    "nbsp", "iexcl", "cent", "pound", "curren", "yen", "brvbar", "sect", "uml", "copy", "ordf",
    "laquo", "not", "shy", "reg", "macr", "deg", "plusmn", "sup2", "sup3", "acute", "micro",
    "para", "middot", "cedil", "sup1", "ordm", "raquo", "frac14", "frac12", "frac34", "iquest",
    "Agrave", "Aacute", "Acirc", "Atilde", "Auml", "Aring", "AElig", "Ccedil", "Egrave", "Eacute",
    "Ecirc", "Euml", "Igrave", "Iacute", "Icirc", "Iuml", "ETH", "Ntilde", "Ograve", "Oacute",
    "Ocirc", "Otilde", "Ouml", "times", "Oslash", "Ugrave", "Uacute", "Ucirc", "Uuml", "Yacute",
    "THORN", "szlig", "agrave", "aacute", "acirc", "atilde", "auml", "aring", "aelig", "ccedil",
    "egrave", "eacute", "ecirc", "euml", "igrave", "iacute", "icirc", "iuml", "eth", "ntilde",
    "ograve", "oacute", "ocirc", "otilde", "ouml", "divide", "oslash", "ugrave", "uacute", "ucirc",
    "uuml", "yacute", "thorn", "yuml",
];

/// HTML 4 symbols and special characters outside Latin-1
static NAMED: &[(&str, u32)] = &[
    ("OElig", 338), ("oelig", 339), ("Scaron", 352), ("scaron", 353), ("Yuml", 376),
    ("fnof", 402), ("circ", 710), ("tilde", 732),
    ("Alpha", 913), ("Beta", 914), ("Gamma", 915), ("Delta", 916), ("Epsilon", 917),
    ("Zeta", 918), ("Eta", 919), ("Theta", 920), ("Iota", 921), ("Kappa", 922),
    ("Lambda", 923), ("Mu", 924), ("Nu", 925), ("Xi", 926), ("Omicron", 927), ("Pi", 928),
    ("Rho", 929), ("Sigma", 931), ("Tau", 932), ("Upsilon", 933), ("Phi", 934), ("Chi", 935),
    ("Psi", 936), ("Omega", 937),
    ("alpha", 945), ("beta", 946), ("gamma", 947), ("delta", 948), ("epsilon", 949),
    ("zeta", 950), ("eta", 951), ("theta", 952), ("iota", 953), ("kappa", 954),
    ("lambda", 955), ("mu", 956), ("nu", 957), ("xi", 958), ("omicron", 959), ("pi", 960),
    ("rho", 961), ("sigmaf", 962), ("sigma", 963), ("tau", 964), ("upsilon", 965),
    ("phi", 966), ("chi", 967), ("psi", 968), ("omega", 969), ("thetasym", 977),
    ("upsih", 978), ("piv", 982),
    ("ensp", 8194), ("emsp", 8195), ("thinsp", 8201), ("zwnj", 8204), ("zwj", 8205),
    ("lrm", 8206), ("rlm", 8207), ("ndash", 8211), ("mdash", 8212), ("lsquo", 8216),
    ("rsquo", 8217), ("sbquo", 8218), ("ldquo", 8220), ("rdquo", 8221), ("bdquo", 8222),
    ("dagger", 8224), ("Dagger", 8225), ("bull", 8226), ("hellip", 8230), ("permil", 8240),
    ("prime", 8242), ("Prime", 8243), ("lsaquo", 8249), ("rsaquo", 8250), ("oline", 8254),
    ("frasl", 8260), ("euro", 8364), ("image", 8465), ("weierp", 8472), ("real", 8476),
    ("trade", 8482), ("alefsym", 8501),
    ("larr", 8592), ("uarr", 8593), ("rarr", 8594), ("darr", 8595), ("harr", 8596),
    ("crarr", 8629), ("lArr", 8656), ("uArr", 8657), ("rArr", 8658), ("dArr", 8659),
    ("hArr", 8660),
    ("forall", 8704), ("part", 8706), ("exist", 8707), ("empty", 8709), ("nabla", 8711),
    ("isin", 8712), ("notin", 8713), ("ni", 8715), ("prod", 8719), ("sum", 8721),
    ("minus", 8722), ("lowast", 8727), ("radic", 8730), ("prop", 8733), ("infin", 8734),
    ("ang", 8736), ("and", 8743), ("or", 8744), ("cap", 8745), ("cup", 8746), ("int", 8747),
    ("there4", 8756), ("sim", 8764), ("cong", 8773), ("asymp", 8776), ("ne", 8800),
    ("equiv", 8801), ("le", 8804), ("ge", 8805), ("sub", 8834), ("sup", 8835),
    ("nsub", 8836), ("sube", 8838), ("supe", 8839), ("oplus", 8853), ("otimes", 8855),
    ("perp", 8869), ("sdot", 8901), ("lceil", 8968), ("rceil", 8969), ("lfloor", 8970),
    ("rfloor", 8971), ("lang", 9001), ("rang", 9002), ("loz", 9674), ("spades", 9824),
    ("clubs", 9827), ("hearts", 9829), ("diams", 9830),
];

/// Code point of a named entity
pub fn named_entity(name: &[u8]) -> Option<u32> {
    match name {
        b"lt" => return Some('<' as u32),
        b"gt" => return Some('>' as u32),
        b"amp" => return Some('&' as u32),
        b"quot" => return Some('"' as u32),
        b"apos" => return Some('\'' as u32),
        _ => {}
    }
    if let Some(i) = LATIN1.iter().position(|n| n.as_bytes() == name) {
        return Some(0xA0 + i as u32);
    }
    NAMED
        .iter()
        .find(|(n, _)| n.as_bytes() == name)
        .map(|&(_, cp)| cp)
}
