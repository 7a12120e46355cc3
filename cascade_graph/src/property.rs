//! Typed named values attached to nodes.
//!
//! Property names are prefixed with the concern they belong to:
//!
//! | Prefix | Meaning |
//! |---|---|
//! | `node:` | Node-level metadata (name, domain, class). |
//! | `config:` | Configuration input. |
//! | `state:` | Read-only state published by the node's run. |
//! | `input:` | Declares an input channel (value is the channel kind). |
//! | `output:` | Declares an output channel (value is the channel kind). |
//! | `plugin:` | Host-specific plugin parameters. |
//!
//! An unqualified name is coerced to `config:` on lookup.

use ecow::EcoString;

use crate::Sample;
use crate::fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Size,
    Integer,
    Real,
    String,
}

/// One discriminated property value. Cross-kind access is a wiring bug and
/// fatal; the accessors check at the boundary so the hot path does not.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Size(u64),
    Integer(i64),
    Real(Sample),
    String(EcoString),
}

impl PropertyValue {
    pub fn default_for(kind: PropertyKind) -> PropertyValue {
        match kind {
            PropertyKind::Size => PropertyValue::Size(0),
            PropertyKind::Integer => PropertyValue::Integer(0),
            PropertyKind::Real => PropertyValue::Real(0.0),
            PropertyKind::String => PropertyValue::String(EcoString::new()),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Size(_) => PropertyKind::Size,
            PropertyValue::Integer(_) => PropertyKind::Integer,
            PropertyValue::Real(_) => PropertyKind::Real,
            PropertyValue::String(_) => PropertyKind::String,
        }
    }

    /// Stringify the value.
    pub fn get(&self) -> String {
        match self {
            PropertyValue::Size(v) => v.to_string(),
            PropertyValue::Integer(v) => v.to_string(),
            PropertyValue::Real(v) => v.to_string(),
            PropertyValue::String(v) => v.to_string(),
        }
    }

    /// Parse a string into the value's kind.
    pub fn set_from_str(&mut self, value: &str) {
        match self {
            PropertyValue::Size(v) => match value.parse::<u64>() {
                Ok(parsed) => *v = parsed,
                Err(_) => fault!("could not parse {value:?} as a size"),
            },
            PropertyValue::Integer(v) => match value.parse::<i64>() {
                Ok(parsed) => *v = parsed,
                Err(_) => fault!("could not parse {value:?} as an integer"),
            },
            PropertyValue::Real(v) => match value.parse::<Sample>() {
                Ok(parsed) => *v = parsed,
                Err(_) => fault!("could not parse {value:?} as a real"),
            },
            PropertyValue::String(v) => *v = EcoString::from(value),
        }
    }

    /// Store a number into a numeric kind.
    pub fn set_number(&mut self, value: f64) {
        match self {
            PropertyValue::Size(v) => *v = value as u64,
            PropertyValue::Integer(v) => *v = value as i64,
            PropertyValue::Real(v) => *v = value as Sample,
            PropertyValue::String(_) => fault!("numeric set is unsupported for string properties"),
        }
    }

    pub fn as_size(&self) -> u64 {
        match self {
            PropertyValue::Size(v) => *v,
            _ => fault!("property is not of kind: size"),
        }
    }

    pub fn as_integer(&self) -> i64 {
        match self {
            PropertyValue::Integer(v) => *v,
            _ => fault!("property is not of kind: integer"),
        }
    }

    pub fn as_real(&self) -> Sample {
        match self {
            PropertyValue::Real(v) => *v,
            _ => fault!("property is not of kind: real"),
        }
    }

    pub fn as_string(&self) -> EcoString {
        match self {
            PropertyValue::String(v) => v.clone(),
            _ => fault!("property is not of kind: string"),
        }
    }

    pub fn set_size(&mut self, value: u64) {
        match self {
            PropertyValue::Size(v) => *v = value,
            _ => fault!("property is not of kind: size"),
        }
    }

    pub fn set_integer(&mut self, value: i64) {
        match self {
            PropertyValue::Integer(v) => *v = value,
            _ => fault!("property is not of kind: integer"),
        }
    }

    pub fn set_real(&mut self, value: Sample) {
        match self {
            PropertyValue::Real(v) => *v = value,
            _ => fault!("property is not of kind: real"),
        }
    }

    pub fn set_string(&mut self, value: &str) {
        match self {
            PropertyValue::String(v) => *v = EcoString::from(value),
            _ => fault!("property is not of kind: string"),
        }
    }
}

/// Coerce an unqualified property name into the `config:` namespace.
pub fn fully_qualify(name: &str) -> EcoString {
    if name.contains(':') {
        EcoString::from(name)
    } else {
        let mut qualified = EcoString::from("config:");
        qualified.push_str(name);
        qualified
    }
}
