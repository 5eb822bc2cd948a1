use rand::Rng;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
const XRAY_SEQUENCE_MAX: u32 = 0x7F_FFFF;

/// Correlation ids attached to every signed call.
pub struct TraceIdGenerator;

impl TraceIdGenerator {
    /// 16 random lowercase hex digits (`x-b3-traceid`).
    pub fn b3<R: Rng + ?Sized>(rng: &mut R) -> String {
        random_hex(rng, 16)
    }

    /// `x-xray-traceid`: 12 hex digits of the millisecond clock, 5 hex digits
    /// of a random sequence, 15 random hex digits.
    pub fn xray<R: Rng + ?Sized>(rng: &mut R, timestamp_ms: u64) -> String {
        let mut clock = format!("{timestamp_ms:012x}");
        clock.truncate(12);
        let mut sequence = format!("{:05x}", rng.gen_range(0..=XRAY_SEQUENCE_MAX));
        sequence.truncate(5);
        format!("{clock}{sequence}{}", random_hex(rng, 15))
    }
}

fn random_hex<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())]))
        .collect()
}
