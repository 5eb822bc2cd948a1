use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};

/// User agent the upstream web client reports inside the fingerprint,
/// independent of the session's own user agent.
pub const PUBLIC_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36 Edg/142.0.0.0";

const GPU_VENDORS: &[(&str, &str)] = &[
    (
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) HD Graphics 520 (0x1912) Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    (
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) UHD Graphics 620 (0x00003EA0) Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    (
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce GTX 1060 6GB (0x000010DE) Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    (
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 (0x0000250F) Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    (
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 580 2048SP (0x00006FDF) Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
];

const SCREEN_RESOLUTIONS: &[((u32, u32), f64)] = &[
    ((1366, 768), 0.25),
    ((1600, 900), 0.15),
    ((1920, 1080), 0.45),
    ((2560, 1440), 0.15),
];
const AVAIL_WIDTH_INSETS: &[u32] = &[0, 30, 60];
const AVAIL_HEIGHT_INSETS: &[u32] = &[30, 60, 80];
const COLOR_DEPTHS: &[(u32, f64)] = &[(24, 0.7), (32, 0.3)];
const DEVICE_MEMORY: &[(u32, f64)] = &[(4, 0.4), (8, 0.4), (16, 0.2)];
const CORE_COUNTS: &[(u32, f64)] = &[(4, 0.5), (6, 0.3), (8, 0.2)];

const BROWSER_PLUGINS: &str =
    "PDF Viewer,Chrome PDF Viewer,Chromium PDF Viewer,Microsoft Edge PDF Viewer,WebKit built-in PDF";
const CANVAS_HASH: &str = "742cc32c";
const VOICE_HASH: &str = "10311144241322244122";
const FONTS: &str = "system-ui, \"Apple Color Emoji\", \"Segoe UI Emoji\", sans-serif";

/// Forged browser environment, keyed `x1`..`x82` in the order the upstream
/// client emits them.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintDescriptor {
    fields: Map<String, Value>,
}

impl FingerprintDescriptor {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Ordered copy of the listed keys; absent keys are skipped.
    pub fn subset(&self, keys: &[&str]) -> Map<String, Value> {
        keys.iter()
            .filter_map(|key| {
                self.fields
                    .get(*key)
                    .map(|value| ((*key).to_string(), value.clone()))
            })
            .collect()
    }
}

/// Samples fingerprint descriptors. The device identifier (`x53`) is fixed
/// for the forger's lifetime; every other field is drawn per call.
#[derive(Debug, Clone)]
pub struct FingerprintForger {
    device_id: String,
}

impl FingerprintForger {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            device_id: random_digest(rng),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn forge<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        cookies: &[(String, String)],
        timestamp_ms: i64,
    ) -> FingerprintDescriptor {
        let cookie_string = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        let (vendor, renderer) = GPU_VENDORS
            .choose(rng)
            .copied()
            .unwrap_or(GPU_VENDORS[0]);
        let (width, height) = *weighted(rng, SCREEN_RESOLUTIONS);
        let avail_width = width - AVAIL_WIDTH_INSETS.choose(rng).copied().unwrap_or(0);
        let avail_height = height - AVAIL_HEIGHT_INSETS.choose(rng).copied().unwrap_or(30);
        let color_depth = weighted(rng, COLOR_DEPTHS);
        let memory = weighted(rng, DEVICE_MEMORY);
        let cores = weighted(rng, CORE_COUNTS);
        let canvas_digest = random_digest(rng);
        let webgl_digest = random_digest(rng);
        let frame_depth = rng.gen_range(1..=20u32);

        let mut fields = Map::new();
        let mut put = |key: &str, value: Value| {
            fields.insert(key.to_string(), value);
        };
        put("x1", PUBLIC_USER_AGENT.into());
        put("x2", "false".into());
        put("x3", "zh-CN".into());
        put("x4", color_depth.to_string().into());
        put("x5", memory.to_string().into());
        put("x6", "24".into());
        put("x7", format!("{vendor},{renderer}").into());
        put("x8", cores.to_string().into());
        put("x9", format!("{width};{height}").into());
        put("x10", format!("{avail_width};{avail_height}").into());
        put("x11", "-480".into());
        put("x12", "Asia/Shanghai".into());
        put("x13", "true".into());
        put("x14", "true".into());
        put("x15", "true".into());
        put("x16", "false".into());
        put("x17", "false".into());
        put("x18", "un".into());
        put("x19", "Win32".into());
        put("x20", "".into());
        put("x21", BROWSER_PLUGINS.into());
        put("x22", canvas_digest.into());
        put("x23", "false".into());
        put("x24", "false".into());
        put("x25", "false".into());
        put("x26", "false".into());
        put("x27", "false".into());
        put("x28", "0,false,false".into());
        put("x29", "4,7,8".into());
        put("x30", "swf object not loaded".into());
        put("x33", "0".into());
        put("x34", "0".into());
        put("x35", "0".into());
        put("x36", frame_depth.to_string().into());
        put("x37", "0|0|0|0|0|0|0|0|0|1|0|0|0|0|0|0|0|0|1|0|0|0|0|0".into());
        put(
            "x38",
            "0|0|1|0|1|0|0|0|0|0|1|0|1|0|1|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0".into(),
        );
        put("x39", 0.into());
        put("x40", "0".into());
        put("x41", "0".into());
        put("x42", "3.4.4".into());
        put("x43", CANVAS_HASH.into());
        put("x44", timestamp_ms.to_string().into());
        put("x45", "__SEC_CAV__1-1-1-1-1|__SEC_WSA__|".into());
        put("x46", "false".into());
        put("x47", "1|0|0|0|0|0".into());
        put("x48", "".into());
        put("x49", "{list:[],type:}".into());
        put("x50", "".into());
        put("x51", "".into());
        put("x52", "".into());
        put(
            "x55",
            "380,380,360,400,380,400,420,380,400,400,360,360,440,420".into(),
        );
        put("x56", format!("{vendor}|{renderer}|{webgl_digest}|35").into());
        put("x57", cookie_string.into());
        put("x58", "180".into());
        put("x59", "2".into());
        put("x60", "63".into());
        put("x61", "1291".into());
        put("x62", "2047".into());
        put("x63", "0".into());
        put("x64", "0".into());
        put("x65", "0".into());
        put(
            "x66",
            json!({
                "referer": "",
                "location": "https://www.xiaohongshu.com/explore",
                "frame": 0
            }),
        );
        put("x67", "1|0".into());
        put("x68", "0".into());
        put("x69", "326|1292|30".into());
        put("x70", json!(["location"]));
        put("x71", "true".into());
        put("x72", "complete".into());
        put("x73", "1191".into());
        put("x74", "0|0|0".into());
        put("x75", "Google Inc.".into());
        put("x76", "true".into());
        put("x77", "1|1|1|1|1|1|1|1|1|1".into());
        put(
            "x78",
            json!({
                "x": 0,
                "y": 2400,
                "left": 0,
                "right": 290.828125,
                "bottom": 2418,
                "height": 18,
                "top": 2400,
                "width": 290.828125,
                "font": FONTS
            }),
        );
        put("x82", "_0x17a2|_0x1954".into());
        put("x31", "124.04347527516074".into());
        put("x79", "144|599565058866".into());
        put("x53", self.device_id.clone().into());
        put("x54", VOICE_HASH.into());
        put("x80", "1|[object FileSystemDirectoryHandle]".into());

        FingerprintDescriptor { fields }
    }
}

fn weighted<'a, R: Rng + ?Sized, T>(rng: &mut R, options: &'a [(T, f64)]) -> &'a T {
    let (value, _) = options
        .choose_weighted(rng, |(_, weight)| *weight)
        .unwrap_or(&options[0]);
    value
}

fn random_digest<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut seed = [0u8; 32];
    rng.fill(&mut seed);
    format!("{:x}", md5::compute(seed))
}
