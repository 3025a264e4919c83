use serde::{Deserialize, Serialize};

/// An argument handed across the bridge by the host runtime. Values the
/// embedded runtime cannot accept keep only their host type name so the
/// bridge can reject them with a positioned diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArg {
    Integer(i64),
    Number(f64),
    String(String),
    Unsupported(String),
}

impl HostArg {
    pub fn type_name(&self) -> &str {
        match self {
            HostArg::Integer(_) => "integer",
            HostArg::Number(_) => "number",
            HostArg::String(_) => "string",
            HostArg::Unsupported(name) => name,
        }
    }
}

/// Return channel from the embedded runtime back to the host runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum BridgeValue {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl BridgeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BridgeValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, BridgeValue::Nil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_arg_type_names_cover_all_kinds() {
        assert_eq!(HostArg::Integer(1).type_name(), "integer");
        assert_eq!(HostArg::Number(1.5).type_name(), "number");
        assert_eq!(HostArg::String("x".to_string()).type_name(), "string");
        assert_eq!(HostArg::Unsupported("table".to_string()).type_name(), "table");
    }

    #[test]
    fn bridge_value_serializes_with_kind_tag() {
        let json = serde_json::to_string(&BridgeValue::String("ok".to_string()))
            .expect("bridge value should serialize");
        assert_eq!(json, r#"{"kind":"string","value":"ok"}"#);
        assert!(BridgeValue::default().is_nil());
        assert_eq!(BridgeValue::String("a".to_string()).as_str(), Some("a"));
        assert_eq!(BridgeValue::Integer(3).as_str(), None);
    }
}
