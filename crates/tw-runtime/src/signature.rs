use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

fn signature_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\((_(?:,_)*)?\)$")
            .expect("call signature regex must compile")
    })
}

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
    })
}

pub fn is_identifier(text: &str) -> bool {
    identifier_regex().is_match(text)
}

/// A method name plus argument count, written `name(_,_)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSignature {
    name: String,
    arity: usize,
}

impl CallSignature {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let captures = signature_regex().captures(text)?;
        let name = captures.get(1)?.as_str();
        let arity = captures
            .get(2)
            .map(|placeholders| placeholders.as_str().split(',').count())
            .unwrap_or(0);
        Some(Self::new(name, arity))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_private(&self) -> bool {
        self.name.starts_with('_')
    }

    pub fn is_callable_name(&self) -> bool {
        is_identifier(&self.name)
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        f.write_str("(")?;
        for index in 0..self.arity {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str("_")?;
        }
        f.write_str(")")
    }
}
