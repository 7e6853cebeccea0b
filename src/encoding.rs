// How the target transports its ciphertext.
use crate::{Error, Result};

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        Engine,
    },
};

use std::{fmt, str::FromStr};

// Padded standard base64 that ignores non-zero bits in the final symbol.
// Tokens minted by sloppy encoders still decode.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    Hex,
    Raw,
}

impl Encoding {
    /// Guesses the encoding of a sample: hex first, since every hex string of
    /// the right length is also valid base64.
    pub fn detect(sample: &str) -> Result<Self> {
        if sample.is_empty() {
            return Err(Error::config("Sample is empty"));
        }
        if sample.len() % 2 == 0 && sample.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Self::Hex);
        }
        if sample.len() % 4 == 0 && LENIENT_BASE64.decode(sample).is_ok() {
            return Ok(Self::Base64);
        }
        Err(Error::config(
            "Cannot auto-detect sample encoding. Use the -E option to set a value",
        ))
    }

    pub fn decode(&self, encoded: &str) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => LENIENT_BASE64
                .decode(encoded)
                .map_err(|e| Error::config(format!("Invalid base64 sample: {}", e))),
            Self::Hex => {
                hex::decode(encoded).map_err(|e| Error::config(format!("Invalid hex sample: {}", e)))
            }
            Self::Raw => Ok(encoded.as_bytes().to_vec()),
        }
    }

    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Base64 => STANDARD.encode(bytes),
            Self::Hex => hex::encode(bytes),
            Self::Raw => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            "raw" | "utf8" | "utf-8" => Ok(Self::Raw),
            _ => Err(Error::config(format!("Invalid encoding: {}", s))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Base64 => "base64",
            Self::Hex => "hex",
            Self::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Percent-encodes everything except the characters JavaScript's
/// `encodeURIComponent` leaves alone.
pub fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Reverses `url_encode`. Malformed escapes are kept as they are.
pub fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
