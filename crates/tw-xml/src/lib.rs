mod document;
mod error;
mod serialize;

pub use document::{DocumentId, NodeHandle, NodeKind, XmlDocument};
pub use error::XmlError;
