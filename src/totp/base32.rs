//! RFC 4648 base32, as used for authenticator app secrets.
//!
//! Encoding never pads. Decoding is case-insensitive and tolerates
//! trailing `=` padding and embedded spaces, since users type secrets in
//! by hand.

use data_encoding::BASE32_NOPAD;

use crate::error::{DaylogError, Result};

/// Encode bytes as unpadded uppercase base32.
pub fn encode(data: &[u8]) -> String {
    BASE32_NOPAD.encode(data)
}

/// Encode bytes as unpadded lowercase base32.
pub fn encode_lower(data: &[u8]) -> String {
    encode(data).to_ascii_lowercase()
}

/// Decode base32 text.
///
/// Fails with [`DaylogError::InvalidInput`] on characters outside the
/// alphabet, padding in the middle of the input, or a length no encoder
/// could have produced.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let unpadded = cleaned.trim_end_matches('=');
    if unpadded.contains('=') {
        return Err(DaylogError::InvalidInput(
            "base32 padding in the middle of input".to_string(),
        ));
    }

    BASE32_NOPAD
        .decode(unpadded.as_bytes())
        .map_err(|e| DaylogError::InvalidInput(format!("invalid base32: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc4648_vectors() {
        let vectors: &[(&[u8], &str)] = &[
            (b"", ""),
            (b"f", "MY"),
            (b"fo", "MZXQ"),
            (b"foo", "MZXW6"),
            (b"foob", "MZXW6YQ"),
            (b"fooba", "MZXW6YTB"),
            (b"foobar", "MZXW6YTBOI"),
        ];
        for (raw, encoded) in vectors {
            assert_eq!(encode(raw), *encoded);
            assert_eq!(decode(encoded).unwrap(), *raw);
        }
    }

    #[test]
    fn test_hello_lowercase() {
        assert_eq!(encode_lower(b"hello"), "nbswy3dp");
        assert_eq!(decode("nbswy3dp").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_is_lenient_about_formatting() {
        assert_eq!(decode("MZXW 6YTB OI======").unwrap(), b"foobar");
        assert_eq!(decode("mzxw6ytboi").unwrap(), b"foobar");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("MZXW1"), Err(DaylogError::InvalidInput(_))));
        assert!(matches!(decode("MZ=XW"), Err(DaylogError::InvalidInput(_))));
        assert!(matches!(decode("MZX"), Err(DaylogError::InvalidInput(_))));
    }

    #[test]
    fn test_decode_rejects_nonzero_trailing_bits() {
        // "MY" is the only encoding of "f"; "MZ" sets a bit past the last byte
        assert_eq!(decode("MY").unwrap(), b"f");
        assert!(matches!(decode("MZ"), Err(DaylogError::InvalidInput(_))));
    }
}
