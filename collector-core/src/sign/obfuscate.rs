use serde_json::json;

use super::encoding::TokenAlphabet;
use super::error::SignResult;

/// Static keystream XORed over the carried frame.
pub const KEYSTREAM: [u8; 124] = [
    0x71, 0xa3, 0x02, 0x25, 0x77, 0x93, 0x27, 0x1d, 0xdd, 0x27, 0x3b, 0xce,
    0xe3, 0xe4, 0xb9, 0x8d, 0x9d, 0x79, 0x35, 0xe1, 0xda, 0x33, 0xf5, 0x76,
    0x5e, 0x2e, 0xa8, 0xaf, 0xb6, 0xdc, 0x77, 0xa5, 0x1a, 0x49, 0x9d, 0x23,
    0xb6, 0x7c, 0x20, 0x66, 0x00, 0x25, 0x86, 0x0c, 0xbf, 0x13, 0xd4, 0x54,
    0x0d, 0x92, 0x49, 0x7f, 0x58, 0x68, 0x6c, 0x57, 0x4e, 0x50, 0x8f, 0x46,
    0xe1, 0x95, 0x63, 0x44, 0xf3, 0x91, 0x39, 0xbf, 0x4f, 0xaf, 0x22, 0xa3,
    0xee, 0xf1, 0x20, 0xb7, 0x92, 0x58, 0x14, 0x5b, 0x2f, 0xeb, 0x51, 0x93,
    0xb6, 0x47, 0x86, 0x69, 0x96, 0x12, 0x98, 0xe7, 0x9b, 0xed, 0xca, 0x64,
    0x6e, 0x1a, 0x69, 0x3a, 0x92, 0x61, 0x54, 0xa5, 0xa7, 0xa1, 0xbd, 0x1c,
    0xf0, 0xde, 0xdb, 0x74, 0x2f, 0x91, 0x7a, 0x74, 0x7a, 0x1e, 0x38, 0x8b,
    0x23, 0x4f, 0x22, 0x77,
];

const APP_VERSION: &str = "4.2.6";
const APP_CHANNEL: &str = "xhs-pc-web";
const PLATFORM_NAME: &str = "Windows";
const TOKEN_PREFIX: &str = "mns0301_";
const HEADER_PREFIX: &str = "XYS_";

pub struct Obfuscator;

impl Obfuscator {
    /// XOR against the keystream. Bytes past the keystream pass through.
    pub fn xor_keystream(data: &mut [u8]) {
        for (byte, key) in data.iter_mut().zip(KEYSTREAM.iter()) {
            *byte ^= key;
        }
    }

    /// Obfuscated frame encoded with the frame alphabet (the `x3` token body).
    pub fn primary_token(frame: &[u8]) -> String {
        let mut buffer = frame.to_vec();
        Self::xor_keystream(&mut buffer);
        TokenAlphabet::Frame.encode(&buffer)
    }

    /// `XYS_` header value wrapping the token in the signature envelope.
    pub fn primary_header(token: &str) -> SignResult<String> {
        let envelope = json!({
            "x0": APP_VERSION,
            "x1": APP_CHANNEL,
            "x2": PLATFORM_NAME,
            "x3": format!("{TOKEN_PREFIX}{token}"),
            "x4": "",
        });
        let text = serde_json::to_string(&envelope)?;
        Ok(format!(
            "{HEADER_PREFIX}{}",
            TokenAlphabet::General.encode(text.as_bytes())
        ))
    }
}
