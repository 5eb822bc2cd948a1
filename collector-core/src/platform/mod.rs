pub mod douyin;
pub mod embedded;
pub mod xhs;

pub use douyin::DouyinClient;
pub use embedded::parse_initial_state;
pub use xhs::XhsClient;
