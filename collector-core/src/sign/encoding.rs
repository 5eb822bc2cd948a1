use base64::alphabet::Alphabet;
use base64::engine::general_purpose::PAD;
use base64::engine::GeneralPurpose;
use base64::Engine as _;

use super::error::SignResult;

const GENERAL_SYMBOLS: &str = "ZmserbBoHQtNP+wOcza/LpngG8yJq42KWYj0DSfdikx3VT16IlUAFM97hECvuRX5";
const FRAME_SYMBOLS: &str = "MfgqrsbcyzPQRStuvC7mn501HIJBo2DEFTKdeNOwxWXYZap89+/A4UVLhijkl63G";

const GENERAL_ALPHABET: Alphabet = match Alphabet::new(GENERAL_SYMBOLS) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("general alphabet must hold 64 distinct symbols"),
};

const FRAME_ALPHABET: Alphabet = match Alphabet::new(FRAME_SYMBOLS) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("frame alphabet must hold 64 distinct symbols"),
};

const GENERAL_ENGINE: GeneralPurpose = GeneralPurpose::new(&GENERAL_ALPHABET, PAD);
const FRAME_ENGINE: GeneralPurpose = GeneralPurpose::new(&FRAME_ALPHABET, PAD);

/// Private base64 alphabets. Each one is a position-wise substitution of the
/// standard alphabet, so `=` padding is untouched.
///
/// `Frame` is only used for the obfuscated frame that becomes `x3`. Every other
/// encoding (the `XYS_` envelope, `b1`, the consistency header) uses `General`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAlphabet {
    General,
    Frame,
}

impl TokenAlphabet {
    fn engine(self) -> &'static GeneralPurpose {
        match self {
            TokenAlphabet::General => &GENERAL_ENGINE,
            TokenAlphabet::Frame => &FRAME_ENGINE,
        }
    }

    pub fn encode(self, bytes: impl AsRef<[u8]>) -> String {
        self.engine().encode(bytes)
    }

    pub fn decode(self, text: &str) -> SignResult<Vec<u8>> {
        Ok(self.engine().decode(text)?)
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    const STANDARD_SYMBOLS: &str =
        "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    #[test]
    fn encodes_known_vectors() {
        assert_eq!(TokenAlphabet::General.encode(b"hello"), "yBpVJBu=");
        assert_eq!(TokenAlphabet::Frame.encode(b"hello"), "Jb5ZBbl=");
    }

    #[test]
    fn matches_transliterated_standard_output() {
        let input = b"\x00\x01\xfe\xffxhs-pc-web{\"x0\":\"4.2.6\"}";
        let standard = STANDARD.encode(input);
        let expected: String = standard
            .chars()
            .map(|ch| match STANDARD_SYMBOLS.find(ch) {
                Some(index) => GENERAL_SYMBOLS.as_bytes()[index] as char,
                None => ch,
            })
            .collect();
        assert_eq!(TokenAlphabet::General.encode(input), expected);
    }

    #[test]
    fn decode_inverts_encode() {
        for alphabet in [TokenAlphabet::General, TokenAlphabet::Frame] {
            for len in 0..40usize {
                let bytes: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
                let encoded = alphabet.encode(&bytes);
                assert_eq!(alphabet.decode(&encoded).unwrap(), bytes);
            }
        }
    }

    #[test]
    fn rejects_symbols_outside_alphabet() {
        assert!(TokenAlphabet::General.decode("yBp*JBu=").is_err());
    }
}
