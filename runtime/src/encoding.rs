//! Byte encodings for the Conversion utility, plus the hex helpers shared
//! with the crypto module.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use blockscript::keyword::Encoding;

use crate::error::RuntimeError;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

pub fn hex_decode(text: &str) -> Result<Vec<u8>, RuntimeError> {
    let text = text.trim();
    let text = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    if text.len() % 2 != 0 {
        return Err(RuntimeError::Encoding(format!("odd number of hex digits in '{}'", text)));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| RuntimeError::Encoding(format!("invalid hex digits at offset {}", i)))
        })
        .collect()
}

fn bin_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:08b}", b)).collect()
}

fn bin_decode(text: &str) -> Result<Vec<u8>, RuntimeError> {
    let bits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if bits.len() % 8 != 0 {
        return Err(RuntimeError::Encoding(format!(
            "binary input has {} bits, not a multiple of 8",
            bits.len()
        )));
    }
    bits.chunks(8)
        .map(|chunk| {
            chunk.iter().try_fold(0u8, |acc, &bit| match bit {
                b'0' => Ok(acc << 1),
                b'1' => Ok((acc << 1) | 1),
                other => Err(RuntimeError::Encoding(format!("invalid binary digit '{}'", other as char))),
            })
        })
        .collect()
}

/// Bytes of `text` interpreted in `encoding`.
pub fn decode(text: &str, encoding: Encoding) -> Result<Vec<u8>, RuntimeError> {
    match encoding {
        Encoding::Hex => hex_decode(text),
        Encoding::Bin => bin_decode(text),
        Encoding::Base64 => STANDARD
            .decode(text.trim())
            .map_err(|e| RuntimeError::Encoding(format!("invalid base64: {}", e))),
        Encoding::Ascii => Ok(text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }).collect()),
        Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        Encoding::Unicode => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
    }
}

/// `bytes` written out in `encoding`.
pub fn encode(bytes: &[u8], encoding: Encoding) -> Result<String, RuntimeError> {
    match encoding {
        Encoding::Hex => Ok(hex_encode(bytes)),
        Encoding::Bin => Ok(bin_encode(bytes)),
        Encoding::Base64 => Ok(STANDARD.encode(bytes)),
        Encoding::Ascii => Ok(bytes.iter().map(|&b| if b.is_ascii() { b as char } else { '?' }).collect()),
        Encoding::Utf8 => Ok(String::from_utf8_lossy(bytes).into_owned()),
        Encoding::Unicode => {
            if bytes.len() % 2 != 0 {
                return Err(RuntimeError::Encoding("UTF-16 input has an odd number of bytes".into()));
            }
            let units: Vec<u16> = bytes.chunks(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
            Ok(String::from_utf16_lossy(&units))
        }
    }
}

/// `decode(from)` then `encode(to)`.
pub fn convert(input: &str, from: Encoding, to: Encoding) -> Result<String, RuntimeError> {
    let bytes = decode(input, from)?;
    encode(&bytes, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_to_other_encodings() {
        assert_eq!(convert("48656c6c6f", Encoding::Hex, Encoding::Utf8).unwrap(), "Hello");
        assert_eq!(convert("48656C6C6F", Encoding::Hex, Encoding::Base64).unwrap(), "SGVsbG8=");
        assert_eq!(convert("0x41", Encoding::Hex, Encoding::Bin).unwrap(), "01000001");
    }

    #[test]
    fn unicode_is_utf16_little_endian() {
        assert_eq!(convert("AB", Encoding::Unicode, Encoding::Hex).unwrap(), "41004200");
        assert_eq!(convert("41004200", Encoding::Hex, Encoding::Unicode).unwrap(), "AB");
        assert!(convert("410042", Encoding::Hex, Encoding::Unicode).is_err());
    }

    #[test]
    fn ascii_replaces_non_ascii() {
        assert_eq!(convert("é!", Encoding::Ascii, Encoding::Hex).unwrap(), "3f21");
        assert_eq!(convert("ff41", Encoding::Hex, Encoding::Ascii).unwrap(), "?A");
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(decode("abc", Encoding::Hex).is_err());
        assert!(decode("zz", Encoding::Hex).is_err());
        assert!(decode("0102", Encoding::Bin).is_err());
        assert!(decode("0000000200000000", Encoding::Bin).is_err());
        assert!(decode("not base64!", Encoding::Base64).is_err());
    }

    #[test]
    fn binary_round_trip() {
        let bytes = decode("01001000 01101001", Encoding::Bin).unwrap();
        assert_eq!(bytes, b"Hi");
        assert_eq!(encode(&bytes, Encoding::Bin).unwrap(), "0100100001101001");
    }
}
