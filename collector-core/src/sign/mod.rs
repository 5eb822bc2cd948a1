mod checksum;
mod consistency;
mod encoding;
mod error;
mod fingerprint;
mod frame;
mod obfuscate;
mod oracle;
mod rc4;
mod signer;
mod trace;

pub use checksum::crc32_variant;
pub use consistency::{ConsistencyEncoder, CONSISTENCY_FIELDS};
pub use encoding::TokenAlphabet;
pub use error::{SignError, SignResult};
pub use fingerprint::{FingerprintDescriptor, FingerprintForger, PUBLIC_USER_AGENT};
pub use frame::{FrameEncoder, FrameInput, CARRIED_FRAME_LEN, FRAME_LEN};
pub use obfuscate::{Obfuscator, KEYSTREAM};
pub use oracle::{CommandSignOracle, SignOracle};
pub use rc4::Rc4;
pub use signer::{
    extract_uri, get_content_string, post_content_string, SignRequest, SignedHeaderSet,
    XhsSigner,
};
pub use trace::TraceIdGenerator;
