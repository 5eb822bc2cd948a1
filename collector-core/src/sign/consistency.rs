use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Map, Value};

use super::checksum::crc32_variant;
use super::encoding::TokenAlphabet;
use super::error::{SignError, SignResult};
use super::fingerprint::FingerprintDescriptor;
use super::rc4::Rc4;

/// Fingerprint keys carried (encrypted) in the consistency token.
pub const CONSISTENCY_FIELDS: [&str; 18] = [
    "x33", "x34", "x35", "x36", "x37", "x38", "x39", "x42", "x43", "x44", "x45", "x46", "x48",
    "x49", "x50", "x51", "x52", "x82",
];

const CONSISTENCY_KEY: &[u8] = b"xhswebmplfbt";

const SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub struct ConsistencyEncoder;

impl ConsistencyEncoder {
    /// `b1`: RC4 over the compact JSON of the field subset, pushed through a
    /// percent-encode/byte-decode pass and encoded with the general alphabet.
    pub fn b1(descriptor: &FingerprintDescriptor) -> SignResult<String> {
        let subset = descriptor.subset(&CONSISTENCY_FIELDS);
        Self::b1_from_fields(&subset)
    }

    pub fn b1_from_fields(fields: &Map<String, Value>) -> SignResult<String> {
        let plaintext = serde_json::to_string(fields)?;
        let cipher = Rc4::encrypt(CONSISTENCY_KEY, plaintext.as_bytes());
        let latin1: String = cipher.iter().map(|&byte| char::from(byte)).collect();
        let escaped = utf8_percent_encode(&latin1, SAFE).to_string();
        let bytes = escaped_to_bytes(&escaped)?;
        Ok(TokenAlphabet::General.encode(bytes))
    }

    /// The `x-s-common` header value.
    pub fn header(identity: &str, descriptor: &FingerprintDescriptor) -> SignResult<String> {
        let b1 = Self::b1(descriptor)?;
        Self::header_from_b1(identity, &b1)
    }

    pub fn header_from_b1(identity: &str, b1: &str) -> SignResult<String> {
        let checksum = crc32_variant(b1.as_bytes());
        let envelope = json!({
            "s0": 5,
            "s1": "",
            "x0": "1",
            "x1": "4.2.6",
            "x2": "Windows",
            "x3": "xhs-pc-web",
            "x4": "4.86.0",
            "x5": identity,
            "x6": "",
            "x7": "",
            "x8": b1,
            "x9": checksum,
            "x10": 0,
            "x11": "normal",
        });
        let text = serde_json::to_string(&envelope)?;
        Ok(TokenAlphabet::General.encode(text.as_bytes()))
    }
}

/// Reads `%XX` escapes as byte values and every other character as its ASCII
/// code. Text ahead of the first escape is dropped, matching the upstream
/// client.
fn escaped_to_bytes(escaped: &str) -> SignResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(escaped.len());
    for segment in escaped.split('%').skip(1) {
        let malformed = || SignError::MalformedEscape(segment.to_string());
        let hex_part = segment.get(..2).ok_or_else(malformed)?;
        let value = u8::from_str_radix(hex_part, 16).map_err(|_| malformed())?;
        bytes.push(value);
        bytes.extend(segment.bytes().skip(2));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned_fields() -> Map<String, Value> {
        let value = json!({
            "x33": "0",
            "x34": "0",
            "x35": "0",
            "x36": "5",
            "x37": "0|0|0|0|0|0|0|0|0|1|0|0|0|0|0|0|0|0|1|0|0|0|0|0",
            "x38": "0|0|1|0|1|0|0|0|0|0|1|0|1|0|1|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0",
            "x39": 0,
            "x42": "3.4.4",
            "x43": "742cc32c",
            "x44": "1700000000000",
            "x45": "__SEC_CAV__1-1-1-1-1|__SEC_WSA__|",
            "x46": "false",
            "x48": "",
            "x49": "{list:[],type:}",
            "x50": "",
            "x51": "",
            "x52": "",
            "x82": "_0x17a2|_0x1954"
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn b1_matches_reference() {
        let b1 = ConsistencyEncoder::b1_from_fields(&pinned_fields()).unwrap();
        assert_eq!(
            b1,
            "I38rHdgsjopgIvesdVwgIC+oIELmBZ5e3VwXLgFTIxS3bqwErFeexd0ekncAzMFYnqthIhJeDfMDKutRI3KsYorWHPtGrbV0P9WfIi/eWc6eYqtyQApPI37ekmR6QL+5Ii6sdnoeSfqYHqwl2qt5B0DoIx+PGDi/sVtkIxdsxuwr4qtiIhuaIE3e3LV0I3VTIC7e0utl2ADmsLveDSKsSPw5IEvsiVtJOqw8BuwfPpdeTFWOIx4TIiu6ZPwrPut5IvlaLbgs3qtxIxes1VwHIkumIkIyejgsY/WTge7eSqte/D7sDcpipedeYrDtIC6eDVw2IENsSqtlnlSuNjVtIvoekqt3cZ7sVo4gIESyIEle+AFDI3EPKI8BIiWIZPwAIvGj4sesYINsxVwSIC7ef96e0fhPIive6WrS8qwUIE7s1f0s6WAeiVtwpjoeWqwXIvRccAdeduwvp9gsWVw8IxI2I38isqwZgVtI4LTjoAve6peeYqwxIvAeS0Os1DZiIi7sjbos3amyIv6sdqwaICmygVtxgVw4IE7sVVtFIiAsiqtSIENsdutSHuwPnVtdIxkhIvVr27lk2Ive1utCIEDtIkJeYut4bYRtn/0ejgI7Ih4s2uwfJPwSI35skqwWGD5s6WAs3phwIhos3fOs3utscPwaICJsWPw5IiJekeqLICKejd/sfPtUIx7sxuwD4BYaIhQgIv5s1M6e6gvsiLdedVtsIkYTI3ilJutpIxElIEvsxbr38W=="
        );
        assert_eq!(crc32_variant(b1.as_bytes()), 930_348_466);
    }

    #[test]
    fn escapes_are_read_as_bytes() {
        assert_eq!(escaped_to_bytes("%C2%B6D%22u").unwrap(), vec![0xC2, 0xB6, b'D', 0x22, b'u']);
        assert_eq!(escaped_to_bytes("ab%41c").unwrap(), vec![0x41, b'c']);
        assert!(escaped_to_bytes("%G1").is_err());
    }

    #[test]
    fn header_embeds_identity_and_checksum() {
        let header = ConsistencyEncoder::header_from_b1("a1-value", "b1-value").unwrap();
        let decoded = TokenAlphabet::General.decode(&header).unwrap();
        let envelope: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(envelope["x5"], "a1-value");
        assert_eq!(envelope["x8"], "b1-value");
        assert_eq!(envelope["x9"], crc32_variant(b"b1-value"));
        let text = String::from_utf8(decoded).unwrap();
        assert!(text.starts_with(r#"{"s0":5,"s1":"","x0":"1","x1":"4.2.6""#));
        assert!(text.ends_with(r#""x10":0,"x11":"normal"}"#));
    }
}
