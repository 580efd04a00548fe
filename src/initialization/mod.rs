mod error;
mod truncated_normal;

pub use error::RandErr;
pub use truncated_normal::TruncatedNormal;
