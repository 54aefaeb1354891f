use data_encoding::{Encoding, Specification};

use crate::error::{Error, Result};

const SYMBOLS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 base32 without padding. Lowercase input is accepted and bits
/// left over after the last full byte are dropped instead of rejected,
/// which is what authenticator apps do with hand-typed secrets.
fn encoding() -> Result<Encoding> {
    let mut spec = Specification::new();
    spec.symbols.push_str(SYMBOLS);
    spec.translate.from.push_str("abcdefghijklmnopqrstuvwxyz");
    spec.translate.to.push_str("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
    spec.check_trailing_bits = false;
    spec.encoding().map_err(|e| Error::BadKey(e.to_string()))
}

fn is_symbol(c: char) -> bool {
    c.is_ascii_alphabetic() || ('2'..='7').contains(&c)
}

/// Longest prefix length the decoder accepts without padding. A 1, 3 or 6
/// symbol tail never completes another byte, so the last symbol only
/// carries discarded bits.
fn usable_len(len: usize) -> usize {
    match len % 8 {
        1 | 3 | 6 => len - 1,
        _ => len,
    }
}

/// Decode a base32 secret into raw key bytes.
///
/// Whitespace is stripped first. Any other character outside `a-z2-7`
/// (either case) fails the whole decode, padding `=` included.
pub fn decode(input: &str) -> Result<Vec<u8>> {
    let symbols: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(c) = symbols.chars().find(|c| !is_symbol(*c)) {
        return Err(Error::BadKey(format!("invalid base32 character {:?}", c)));
    }

    // all ascii at this point, so byte slicing is safe
    let usable = &symbols[..usable_len(symbols.len())];
    encoding()?
        .decode(usable.as_bytes())
        .map_err(|e| Error::BadKey(e.to_string()))
}

/// Whether `input` looks like a bare secret rather than a url: it has to
/// decode to at least one byte of key.
pub fn is_secret(input: &str) -> bool {
    decode(input).map(|key| !key.is_empty()).unwrap_or(false)
}
