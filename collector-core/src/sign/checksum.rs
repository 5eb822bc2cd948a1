const POLY: u32 = 0xEDB8_8320;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut d = 0;
    while d < 256 {
        let mut r = d as u32;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 1 == 1 { (r >> 1) ^ POLY } else { r >> 1 };
            bit += 1;
        }
        table[d] = r;
        d += 1;
    }
    table
}

/// CRC32 as computed by the upstream web client: the complemented accumulator
/// is XORed with the polynomial once more and read back as a signed 32-bit
/// value. This is not textbook CRC32 and must not be "fixed".
pub fn crc32_variant(data: &[u8]) -> i32 {
    let mut c = u32::MAX;
    for &byte in data {
        c = TABLE[((c ^ u32::from(byte)) & 0xFF) as usize] ^ (c >> 8);
    }
    ((!c) ^ POLY) as i32
}
