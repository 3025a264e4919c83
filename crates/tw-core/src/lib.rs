pub mod config;
pub mod error;
pub mod hash;
pub mod value;

pub use config::TweakConfig;
pub use error::TweakError;
pub use hash::{format_hash, idstring_hash, idstring_hex};
pub use value::{BridgeValue, HostArg};
