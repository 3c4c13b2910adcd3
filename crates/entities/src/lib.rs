//! HTML character-reference decoding.
//!
//! This crate implements the closed reference set used by the document
//! engine: the ASCII escapes, the Latin-1 supplement names, and decimal
//! numeric references. Decoding is deliberately forgiving; any sequence
//! that does not match passes through verbatim.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Longest recognized entity name ("plusmn", "frac12", ...).
const MAX_NAME_LENGTH: usize = 8;

/// Longest digit run accepted in a numeric reference.
const MAX_DIGITS: usize = 7;

lazy_static! {
    static ref NAMED: HashMap<&'static [u8], &'static str> = {
        let mut m: HashMap<&'static [u8], &'static str> = HashMap::new();
        for (name, text) in NAMED_TABLE.iter().copied() {
            m.insert(name.as_bytes(), text);
        }
        m
    };
}

/// The closed named-reference table: ASCII escapes plus the Latin-1
/// supplement (U+00A1 through U+00FF).
static NAMED_TABLE: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
    ("iexcl", "\u{a1}"),
    ("cent", "\u{a2}"),
    ("pound", "\u{a3}"),
    ("curren", "\u{a4}"),
    ("yen", "\u{a5}"),
    ("brvbar", "\u{a6}"),
    ("sect", "\u{a7}"),
    ("uml", "\u{a8}"),
    ("copy", "\u{a9}"),
    ("ordf", "\u{aa}"),
    ("laquo", "\u{ab}"),
    ("not", "\u{ac}"),
    ("shy", "\u{ad}"),
    ("reg", "\u{ae}"),
    ("macr", "\u{af}"),
    ("deg", "\u{b0}"),
    ("plusmn", "\u{b1}"),
    ("sup2", "\u{b2}"),
    ("sup3", "\u{b3}"),
    ("acute", "\u{b4}"),
    ("micro", "\u{b5}"),
    ("para", "\u{b6}"),
    ("middot", "\u{b7}"),
    ("cedil", "\u{b8}"),
    ("sup1", "\u{b9}"),
    ("ordm", "\u{ba}"),
    ("raquo", "\u{bb}"),
    ("frac14", "\u{bc}"),
    ("frac12", "\u{bd}"),
    ("frac34", "\u{be}"),
    ("iquest", "\u{bf}"),
    ("Agrave", "\u{c0}"),
    ("Aacute", "\u{c1}"),
    ("Acirc", "\u{c2}"),
    ("Atilde", "\u{c3}"),
    ("Auml", "\u{c4}"),
    ("Aring", "\u{c5}"),
    ("AElig", "\u{c6}"),
    ("Ccedil", "\u{c7}"),
    ("Egrave", "\u{c8}"),
    ("Eacute", "\u{c9}"),
    ("Ecirc", "\u{ca}"),
    ("Euml", "\u{cb}"),
    ("Igrave", "\u{cc}"),
    ("Iacute", "\u{cd}"),
    ("Icirc", "\u{ce}"),
    ("Iuml", "\u{cf}"),
    ("ETH", "\u{d0}"),
    ("Ntilde", "\u{d1}"),
    ("Ograve", "\u{d2}"),
    ("Oacute", "\u{d3}"),
    ("Ocirc", "\u{d4}"),
    ("Otilde", "\u{d5}"),
    ("Ouml", "\u{d6}"),
    ("times", "\u{d7}"),
    ("Oslash", "\u{d8}"),
    ("Ugrave", "\u{d9}"),
    ("Uacute", "\u{da}"),
    ("Ucirc", "\u{db}"),
    ("Uuml", "\u{dc}"),
    ("Yacute", "\u{dd}"),
    ("THORN", "\u{de}"),
    ("szlig", "\u{df}"),
    ("agrave", "\u{e0}"),
    ("aacute", "\u{e1}"),
    ("acirc", "\u{e2}"),
    ("atilde", "\u{e3}"),
    ("auml", "\u{e4}"),
    ("aring", "\u{e5}"),
    ("aelig", "\u{e6}"),
    ("ccedil", "\u{e7}"),
    ("egrave", "\u{e8}"),
    ("eacute", "\u{e9}"),
    ("ecirc", "\u{ea}"),
    ("euml", "\u{eb}"),
    ("igrave", "\u{ec}"),
    ("iacute", "\u{ed}"),
    ("icirc", "\u{ee}"),
    ("iuml", "\u{ef}"),
    ("eth", "\u{f0}"),
    ("ntilde", "\u{f1}"),
    ("ograve", "\u{f2}"),
    ("oacute", "\u{f3}"),
    ("ocirc", "\u{f4}"),
    ("otilde", "\u{f5}"),
    ("ouml", "\u{f6}"),
    ("divide", "\u{f7}"),
    ("oslash", "\u{f8}"),
    ("ugrave", "\u{f9}"),
    ("uacute", "\u{fa}"),
    ("ucirc", "\u{fb}"),
    ("uuml", "\u{fc}"),
    ("yacute", "\u{fd}"),
    ("thorn", "\u{fe}"),
    ("yuml", "\u{ff}"),
];

/*
 * Numeric references in [0x80, 0xA0) are Windows-1252 punctuation typed by
 * authors who believed they were writing Unicode. Rather than emit C1
 * control characters, approximate them with printable ASCII.
 */
static CP1252: [&str; 32] = [
    "EUR",  // 0x80 euro sign
    "?",    // 0x81 unassigned
    ",",    // 0x82 single low quote
    "f",    // 0x83 florin
    ",,",   // 0x84 double low quote
    "...",  // 0x85 ellipsis
    "+",    // 0x86 dagger
    "++",   // 0x87 double dagger
    "^",    // 0x88 circumflex accent
    "%",    // 0x89 per mille
    "S",    // 0x8a S caron
    "<",    // 0x8b single left angle quote
    "OE",   // 0x8c OE ligature
    "?",    // 0x8d unassigned
    "Z",    // 0x8e Z caron
    "?",    // 0x8f unassigned
    "?",    // 0x90 unassigned
    "`",    // 0x91 left single quote
    "'",    // 0x92 right single quote
    "\"",   // 0x93 left double quote
    "\"",   // 0x94 right double quote
    "*",    // 0x95 bullet
    "-",    // 0x96 en dash
    "--",   // 0x97 em dash
    "~",    // 0x98 small tilde
    "(TM)", // 0x99 trademark
    "s",    // 0x9a s caron
    ">",    // 0x9b single right angle quote
    "oe",   // 0x9c oe ligature
    "?",    // 0x9d unassigned
    "z",    // 0x9e z caron
    "Y",    // 0x9f Y diaeresis
];

/// Replacement text for one resolved reference.
pub enum Decoded {
    Text(&'static str),
    Scalar(char),
}

impl Decoded {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Decoded::Text(text) => out.extend_from_slice(text.as_bytes()),
            Decoded::Scalar(ch) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

/// Resolves the character reference beginning at `offset`, which must point
/// at a `&`. On success returns the replacement and the byte length of the
/// reference token, including the terminating `;`.
pub fn decode_reference(input: &[u8], offset: usize) -> Option<(Decoded, usize)> {
    if offset >= input.len() || input[offset] != b'&' {
        return None;
    }
    let rest = &input[offset + 1..];

    if rest.first() == Some(&b'#') {
        let digits = rest[1..]
            .iter()
            .take(MAX_DIGITS + 1)
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits == 0 || digits > MAX_DIGITS || rest.get(1 + digits) != Some(&b';') {
            return None;
        }
        let mut value: u32 = 0;
        for b in &rest[1..1 + digits] {
            value = value * 10 + u32::from(b - b'0');
        }
        let decoded = if (0x80..0xa0).contains(&value) {
            Decoded::Text(CP1252[(value - 0x80) as usize])
        } else {
            let ch = char::from_u32(value)?;
            if ch.is_control() && ch != '\t' && ch != '\n' {
                return None;
            }
            Decoded::Scalar(ch)
        };
        return Some((decoded, digits + 3));
    }

    let name_length = rest
        .iter()
        .take(MAX_NAME_LENGTH + 1)
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_length == 0 || name_length > MAX_NAME_LENGTH || rest.get(name_length) != Some(&b';') {
        return None;
    }
    NAMED
        .get(&rest[..name_length])
        .map(|text| (Decoded::Text(*text), name_length + 2))
}

/// Decodes every character reference in `input`, passing unrecognized
/// sequences through untouched.
pub fn decode(input: &[u8]) -> Box<[u8]> {
    let mut decoded: Vec<u8> = Vec::with_capacity(input.len());
    let mut was_at = 0;
    let mut at = 0;

    while at < input.len() {
        let amp_at = match memchr::memchr(b'&', &input[at..]) {
            Some(pos) => at + pos,
            None => break,
        };

        match decode_reference(input, amp_at) {
            Some((replacement, token_length)) => {
                decoded.extend_from_slice(&input[was_at..amp_at]);
                replacement.write_to(&mut decoded);
                at = amp_at + token_length;
                was_at = at;
            }
            None => {
                at = amp_at + 1;
            }
        }
    }

    decoded.extend_from_slice(&input[was_at..]);
    decoded.into_boxed_slice()
}
