//! Password-gated override of enforcement.

mod password;
mod window;

pub use password::{encode_credential, hash_password, verify_password, LEGACY_SALT};
pub use window::{OverrideManager, OverrideWindow};
