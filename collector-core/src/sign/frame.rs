use rand::Rng;

pub const FRAME_LEN: usize = 125;
/// Bytes of the frame that survive into the token; the trailing byte is
/// always dropped.
pub const CARRIED_FRAME_LEN: usize = 124;

const VERSION_MARKER: [u8; 4] = [119, 104, 96, 41];
const FINGERPRINT_A_XOR: u8 = 41;
const TIME_OFFSET_SECS: (u64, u64) = (10, 50);
const SEQUENCE_RANGE: (u32, u32) = (15, 50);
const WINDOW_PROPS_RANGE: (u32, u32) = (900, 1200);
const IDENTITY_MARKER: u8 = 52;
const IDENTITY_LEN: usize = 52;
const APP_MARKER: u8 = 10;
const APP_LEN: usize = 10;
const CHECKSUM_VERSION: u8 = 1;
const SEED_XOR: u8 = 115;
const FIXED_TAIL: [u8; 14] = [249, 65, 103, 103, 201, 181, 131, 99, 94, 7, 68, 250, 132, 21];

/// Everything a frame is built from. Random members are sampled by
/// [`FrameInput::sample`] or pinned directly in tests.
#[derive(Debug, Clone)]
pub struct FrameInput<'a> {
    pub seed: u32,
    pub timestamp_ms: u64,
    pub time_offset_secs: u64,
    pub sequence: u32,
    pub window_props: u32,
    pub content: &'a str,
    pub identity: &'a str,
    pub app_id: &'a str,
}

impl<'a> FrameInput<'a> {
    pub fn sample<R: Rng + ?Sized>(
        rng: &mut R,
        timestamp_ms: u64,
        content: &'a str,
        identity: &'a str,
        app_id: &'a str,
    ) -> Self {
        Self {
            seed: rng.gen(),
            timestamp_ms,
            time_offset_secs: rng.gen_range(TIME_OFFSET_SECS.0..=TIME_OFFSET_SECS.1),
            sequence: rng.gen_range(SEQUENCE_RANGE.0..=SEQUENCE_RANGE.1),
            window_props: rng.gen_range(WINDOW_PROPS_RANGE.0..=WINDOW_PROPS_RANGE.1),
            content,
            identity,
            app_id,
        }
    }
}

pub struct FrameEncoder;

impl FrameEncoder {
    pub fn encode(input: &FrameInput<'_>) -> [u8; FRAME_LEN] {
        let seed_bytes = input.seed.to_le_bytes();
        let seed_low = seed_bytes[0];
        let digest = md5::compute(input.content.as_bytes());

        let mut frame = Vec::with_capacity(FRAME_LEN);
        frame.extend_from_slice(&VERSION_MARKER);
        frame.extend_from_slice(&seed_bytes);
        frame.extend_from_slice(&fingerprint_a(input.timestamp_ms));
        let shifted = input
            .timestamp_ms
            .saturating_sub(input.time_offset_secs * 1000);
        frame.extend_from_slice(&shifted.to_le_bytes());
        frame.extend_from_slice(&input.sequence.to_le_bytes());
        frame.extend_from_slice(&input.window_props.to_le_bytes());
        frame.extend_from_slice(&(input.content.len() as u32).to_le_bytes());
        frame.extend(digest.0[..8].iter().map(|byte| byte ^ seed_low));
        frame.push(IDENTITY_MARKER);
        frame.extend_from_slice(&fixed_width(input.identity, IDENTITY_LEN));
        frame.push(APP_MARKER);
        frame.extend_from_slice(&fixed_width(input.app_id, APP_LEN));
        frame.push(1);
        frame.push(CHECKSUM_VERSION);
        frame.push(seed_low ^ SEED_XOR);
        frame.extend_from_slice(&FIXED_TAIL);

        let mut out = [0u8; FRAME_LEN];
        out.copy_from_slice(&frame);
        out
    }

    pub fn carried(frame: &[u8; FRAME_LEN]) -> [u8; CARRIED_FRAME_LEN] {
        let mut out = [0u8; CARRIED_FRAME_LEN];
        out.copy_from_slice(&frame[..CARRIED_FRAME_LEN]);
        out
    }
}

fn fingerprint_a(timestamp_ms: u64) -> [u8; 8] {
    let mut bytes = timestamp_ms.to_le_bytes();
    let sum: u32 = bytes[1..8].iter().map(|&b| u32::from(b)).sum();
    bytes[0] = (sum & 0xFF) as u8;
    for byte in bytes.iter_mut() {
        *byte ^= FINGERPRINT_A_XOR;
    }
    bytes
}

fn fixed_width(text: &str, width: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(width, 0);
    bytes
}
