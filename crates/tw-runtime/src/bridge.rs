use rhai::{Dynamic, FLOAT, INT};
use thiserror::Error;
use tracing::debug;
use tw_core::{BridgeValue, HostArg, TweakError};

pub const MAX_DIAGNOSTIC_LEN: usize = 256;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Cannot call function {signature}: name starts with an underscore.")]
    PrivateMethod { signature: String },
    #[error("Cannot call function {signature}: not a valid method name.")]
    InvalidMethodName { signature: String },
    #[error("No such interface object: \"{object}\".")]
    NoSuchObject { object: String },
    #[error("Bad argument {position}: unsupported type {type_name}.")]
    UnsupportedArgument { position: usize, type_name: String },
    #[error("Failed to run function {object}.{signature}: {diagnostic}")]
    Invocation {
        object: String,
        signature: String,
        diagnostic: String,
    },
    #[error("The embedded runtime is not available.")]
    Unavailable,
    #[error("{0}")]
    Fatal(TweakError),
}

impl BridgeError {
    pub fn code(&self) -> &str {
        match self {
            BridgeError::PrivateMethod { .. } => "BRIDGE_PRIVATE_METHOD",
            BridgeError::InvalidMethodName { .. } => "BRIDGE_INVALID_METHOD",
            BridgeError::NoSuchObject { .. } => "BRIDGE_NO_SUCH_OBJECT",
            BridgeError::UnsupportedArgument { .. } => "BRIDGE_UNSUPPORTED_ARGUMENT",
            BridgeError::Invocation { .. } => "BRIDGE_INVOCATION_FAILED",
            BridgeError::Unavailable => "BRIDGE_UNAVAILABLE",
            BridgeError::Fatal(error) => &error.code,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Fatal(_))
    }
}

impl From<BridgeError> for TweakError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Fatal(error) => error,
            other => TweakError::new(other.code().to_string(), other.to_string()),
        }
    }
}

/// Cuts `text` to at most [`MAX_DIAGNOSTIC_LEN`] bytes on a char boundary.
pub fn truncate_diagnostic(text: &str) -> String {
    if text.len() <= MAX_DIAGNOSTIC_LEN {
        return text.to_string();
    }
    let mut end = MAX_DIAGNOSTIC_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

pub fn marshal_args(args: &[HostArg]) -> Result<Vec<Dynamic>, BridgeError> {
    args.iter()
        .enumerate()
        .map(|(index, arg)| match arg {
            HostArg::Integer(value) => Ok(Dynamic::from_int(*value as INT)),
            HostArg::Number(value) => Ok(Dynamic::from_float(*value as FLOAT)),
            HostArg::String(value) => Ok(Dynamic::from(value.clone())),
            HostArg::Unsupported(type_name) => Err(BridgeError::UnsupportedArgument {
                position: index + 1,
                type_name: type_name.clone(),
            }),
        })
        .collect()
}

pub fn to_bridge_value(value: Dynamic) -> BridgeValue {
    if value.is_unit() {
        return BridgeValue::Nil;
    }
    if let Ok(flag) = value.as_bool() {
        return BridgeValue::Bool(flag);
    }
    if let Ok(number) = value.as_int() {
        return BridgeValue::Integer(number as i64);
    }
    if let Ok(number) = value.as_float() {
        return BridgeValue::Number(number as f64);
    }
    if value.is_string() {
        if let Ok(text) = value.into_string() {
            return BridgeValue::String(text);
        }
        return BridgeValue::Nil;
    }
    debug!(type_name = value.type_name(), "dropping non-scalar return value");
    BridgeValue::Nil
}
