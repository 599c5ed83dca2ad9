//! Device declarations - the list of detectors a build asks for
//!
//! Declarations come either from a TOML file with one `[[device]]` table per
//! detector, or from a builder component XML file where each detector is an
//! element such as `<simHDF5Detector.SimHDF5Detector PORT="CAM1"/>`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::args::{ArgMap, ArgValue, ARG_PORT};
use crate::descriptor::Variant;
use crate::error::ValidationError;

/// Component class name of the detector in builder XML files
pub const COMPONENT_CLASS: &str = "SimHDF5Detector";

const VARIANT_KEY: &str = "variant";

#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("Failed to read declarations: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse declarations: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to parse component XML: {0}")]
    XmlError(String),
    #[error("Declaration {index}: {source}")]
    UnknownVariant {
        index: usize,
        source: ValidationError,
    },
    #[error("Unsupported declaration file format: {0}")]
    UnsupportedFormat(String),
}

/// One declared detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDeclaration {
    /// Overrides the build's default variant when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// Constructor and template arguments, keyed by name
    #[serde(flatten)]
    pub args: ArgMap,
}

impl DeviceDeclaration {
    /// Variant to construct, falling back to the build profile
    pub fn variant_or(&self, default: Variant) -> Variant {
        self.variant.unwrap_or(default)
    }

    /// Declared PORT, if it is a string
    pub fn port(&self) -> Option<&str> {
        match self.args.get(ARG_PORT) {
            Some(ArgValue::Str(s)) => Some(s),
            _ => None,
        }
    }
}

/// All detectors declared for one build, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarationSet {
    /// Target architecture named by the component file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceDeclaration>,
}

impl DeclarationSet {
    /// Parse declarations from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, DeclarationError> {
        let set: DeclarationSet = toml::from_str(content)?;
        Ok(set)
    }

    /// Parse declarations from a builder component XML string
    pub fn from_xml(xml: &str) -> Result<Self, DeclarationError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut set = DeclarationSet::default();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if name == "components" {
                        set.arch = attributes(&e)?
                            .into_iter()
                            .find(|(key, _)| key == "arch")
                            .map(|(_, value)| value);
                    } else if class_name(&name) == COMPONENT_CLASS {
                        let index = set.devices.len();
                        set.devices.push(declaration_from_element(&e, index)?);
                    } else {
                        debug!(element = %name, "Skipping unrelated component");
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DeclarationError::XmlError(format!(
                        "at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        debug!(count = set.devices.len(), "Parsed component XML");
        Ok(set)
    }

    /// Load declarations from a `.toml` or `.xml` file
    pub fn from_file(path: &Path) -> Result<Self, DeclarationError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("toml") => Self::from_toml(&std::fs::read_to_string(path)?),
            Some("xml") => Self::from_xml(&std::fs::read_to_string(path)?),
            _ => Err(DeclarationError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Last dotted segment of a component element name
fn class_name(element: &str) -> &str {
    element.rsplit('.').next().unwrap_or(element)
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, DeclarationError> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(|err| DeclarationError::XmlError(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| DeclarationError::XmlError(err.to_string()))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn declaration_from_element(e: &BytesStart<'_>, index: usize) -> Result<DeviceDeclaration, DeclarationError> {
    let mut declaration = DeviceDeclaration::default();
    for (key, value) in attributes(e)? {
        if key == VARIANT_KEY {
            let variant = value
                .parse::<Variant>()
                .map_err(|source| DeclarationError::UnknownVariant { index, source })?;
            declaration.variant = Some(variant);
        } else {
            declaration.args.insert(key, ArgValue::Str(value));
        }
    }
    Ok(declaration)
}
