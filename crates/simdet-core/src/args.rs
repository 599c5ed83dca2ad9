//! Constructor argument metadata and raw argument values
//!
//! Declaration files hand arguments over untyped: TOML keeps integers and
//! floats apart, XML attributes are always strings. [`ArgValue`] holds them
//! until a descriptor or template record converts them into typed fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;

pub const ARG_PORT: &str = "PORT";
pub const ARG_MEMORY: &str = "MEMORY";
pub const ARG_BUFFERS: &str = "BUFFERS";
pub const ARG_DRIVER: &str = "DRIVER";
pub const ARG_P: &str = "P";
pub const ARG_R: &str = "R";
pub const ARG_ADDR: &str = "ADDR";
pub const ARG_TIMEOUT: &str = "TIMEOUT";

/// Expected type of a constructor argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Str,
    Int,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Str => write!(f, "a string"),
            ArgKind::Int => write!(f, "an integer"),
        }
    }
}

/// Static description of one constructor argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArgInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

const PORT_INFO: ArgInfo = ArgInfo {
    name: ARG_PORT,
    description: "Port name for the detector",
    kind: ArgKind::Str,
    required: true,
};

const MEMORY_INFO: ArgInfo = ArgInfo {
    name: ARG_MEMORY,
    description: "Max memory to allocate, should be maxw*maxh*nbuffer for driver and all attached plugins",
    kind: ArgKind::Int,
    required: false,
};

/// Arguments of the simple variant
pub const SIMPLE_ARGS: &[ArgInfo] = &[PORT_INFO, MEMORY_INFO];

/// Arguments of the extended variant
pub const EXTENDED_ARGS: &[ArgInfo] = &[
    PORT_INFO,
    ArgInfo {
        name: ARG_BUFFERS,
        description: "Maximum number of NDArray buffers to be created for plugin callbacks",
        kind: ArgKind::Int,
        required: false,
    },
    MEMORY_INFO,
    ArgInfo {
        name: ARG_DRIVER,
        description: "Port of the simulated camera this detector layers on top of",
        kind: ArgKind::Str,
        required: false,
    },
];

/// Macros of the areaDetector base template, bound alongside every device
pub const TEMPLATE_ARGS: &[ArgInfo] = &[
    ArgInfo {
        name: ARG_P,
        description: "Device Prefix",
        kind: ArgKind::Str,
        required: true,
    },
    ArgInfo {
        name: ARG_R,
        description: "Device Suffix",
        kind: ArgKind::Str,
        required: true,
    },
    ArgInfo {
        name: ARG_ADDR,
        description: "Asyn Port address",
        kind: ArgKind::Int,
        required: false,
    },
    ArgInfo {
        name: ARG_TIMEOUT,
        description: "Timeout",
        kind: ArgKind::Int,
        required: false,
    },
];

/// An argument value as written in a declaration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Arguments of one declared device, keyed by argument name
pub type ArgMap = BTreeMap<String, ArgValue>;

impl ArgValue {
    /// Convert to an integer, accepting integral floats and numeric strings
    pub fn as_integer(&self, field: &'static str) -> Result<i64, ValidationError> {
        let not_an_integer = || ValidationError::NotAnInteger {
            field,
            value: self.to_string(),
        };
        match self {
            ArgValue::Int(v) => Ok(*v),
            ArgValue::Float(f) => integral(*f).ok_or_else(not_an_integer),
            ArgValue::Str(s) => {
                let s = s.trim();
                if let Ok(v) = s.parse::<i64>() {
                    return Ok(v);
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(integral)
                    .ok_or_else(not_an_integer)
            }
            ArgValue::Bool(_) => Err(ValidationError::WrongType {
                field,
                expected: ArgKind::Int,
            }),
        }
    }

    /// Convert to a string; only string values qualify
    pub fn as_string(&self, field: &'static str) -> Result<String, ValidationError> {
        match self {
            ArgValue::Str(s) => Ok(s.clone()),
            _ => Err(ValidationError::WrongType {
                field,
                expected: ArgKind::Str,
            }),
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    // Bounds are exclusive on the top end: 2^63 is representable as f64 but not as i64
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::Float(v) => write!(f, "{}", v),
            ArgValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversion() {
        assert_eq!(ArgValue::Int(-1).as_integer(ARG_MEMORY), Ok(-1));
        assert_eq!(ArgValue::Float(50.0).as_integer(ARG_BUFFERS), Ok(50));
        assert_eq!(ArgValue::from(" 1024 ").as_integer(ARG_MEMORY), Ok(1024));
        assert_eq!(ArgValue::from("8.0").as_integer(ARG_MEMORY), Ok(8));
    }

    #[test]
    fn test_non_integral_rejected() {
        let err = ArgValue::Float(2.5).as_integer(ARG_MEMORY).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotAnInteger {
                field: ARG_MEMORY,
                value: "2.5".to_string()
            }
        );

        assert!(matches!(
            ArgValue::from("lots").as_integer(ARG_BUFFERS),
            Err(ValidationError::NotAnInteger { field: "BUFFERS", .. })
        ));
        assert!(matches!(
            ArgValue::Float(f64::NAN).as_integer(ARG_MEMORY),
            Err(ValidationError::NotAnInteger { .. })
        ));
        assert_eq!(
            ArgValue::Bool(true).as_integer(ARG_MEMORY),
            Err(ValidationError::WrongType {
                field: ARG_MEMORY,
                expected: ArgKind::Int
            })
        );
    }

    #[test]
    fn test_string_conversion() {
        assert_eq!(ArgValue::from("CAM1").as_string(ARG_PORT), Ok("CAM1".to_string()));
        assert!(matches!(
            ArgValue::Int(1).as_string(ARG_PORT),
            Err(ValidationError::WrongType { expected: ArgKind::Str, .. })
        ));
    }

    #[test]
    fn test_arg_tables() {
        assert_eq!(SIMPLE_ARGS.iter().map(|a| a.name).collect::<Vec<_>>(), ["PORT", "MEMORY"]);
        assert_eq!(
            EXTENDED_ARGS.iter().map(|a| a.name).collect::<Vec<_>>(),
            ["PORT", "BUFFERS", "MEMORY", "DRIVER"]
        );
        assert!(SIMPLE_ARGS.iter().filter(|a| a.required).all(|a| a.name == ARG_PORT));
    }
}
