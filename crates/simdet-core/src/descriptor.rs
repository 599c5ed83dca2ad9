//! Device descriptor for the simulated HDF5 detector
//!
//! A [`Descriptor`] is the validated configuration record of one declared
//! detector. It renders the `SimHDF5DetectorConfig` line the IOC startup
//! script runs to create the driver. The line is parsed and diffed by other
//! tooling, so field widths and ordering are fixed:
//!
//! ```text
//! SimHDF5DetectorConfig( <port:>10>, <buffers:>10 | 0>, <memory:>9> )
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::args::{
    ArgInfo, ArgMap, ARG_BUFFERS, ARG_DRIVER, ARG_MEMORY, ARG_PORT, EXTENDED_ARGS, SIMPLE_ARGS,
    TEMPLATE_ARGS,
};
use crate::error::ValidationError;
use crate::template::{DriverParameter, DRIVER_PARAMETERS, TEMPLATE_FILES};

/// Placeholder driver reference used when an extended descriptor names none
pub const DEFAULT_DRIVER_REFERENCE: &str = "SIM.CAM";
pub const DEFAULT_EXTENDED_BUFFERS: u32 = 50;
pub const DEFAULT_SIMPLE_MEMORY: i64 = 0;
pub const DEFAULT_EXTENDED_MEMORY: i64 = -1;

/// Which of the two device definitions a descriptor follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Port and memory only; the buffer count is always rendered as 0
    #[default]
    Simple,
    /// Adds a configurable buffer count and an upstream driver reference
    Extended,
}

impl Variant {
    /// Constructor arguments accepted by this variant
    pub fn arg_info(self) -> &'static [ArgInfo] {
        match self {
            Variant::Simple => SIMPLE_ARGS,
            Variant::Extended => EXTENDED_ARGS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Simple => "simple",
            Variant::Extended => "extended",
        }
    }

    /// Whether a declaration argument is meaningful for this variant.
    /// Template macros ride along with every device; the simple variant
    /// tolerates BUFFERS and ignores it.
    fn accepts(self, name: &str) -> bool {
        self.arg_info().iter().any(|a| a.name == name)
            || TEMPLATE_ARGS.iter().any(|a| a.name == name)
            || (self == Variant::Simple && name == ARG_BUFFERS)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Variant {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Variant::Simple),
            "extended" => Ok(Variant::Extended),
            _ => Err(ValidationError::UnknownVariant(s.to_string())),
        }
    }
}

/// Typed fields of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorConfig {
    /// Asyn port name, unique within a build
    pub port: String,
    /// NDArray buffers the driver may allocate
    pub max_buffers: u32,
    /// Memory budget in bytes; -1 and 0 mean unbounded
    pub max_memory: i64,
    /// Upstream simulated camera port (extended variant only)
    pub driver_reference: Option<String>,
}

/// Validated configuration record of one simulated detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    variant: Variant,
    config: DescriptorConfig,
}

impl Descriptor {
    /// Name of the iocsh command that creates the driver
    pub const COMMAND_NAME: &'static str = "SimHDF5DetectorConfig";
    /// Comment rendered above every init command
    pub const INIT_COMMENT: &'static str = "# SimHDF5DetectorConfig(portName, maxBuffers, maxMemory )";
    /// Native libraries the driver links against
    pub const LIB_FILES: &'static [&'static str] = &["simHDF5Detector"];
    /// Database definition files registering the driver
    pub const DBD_FILES: &'static [&'static str] = &["simHDF5Support"];
    /// Support modules the build must include
    pub const DEPENDENCIES: &'static [&'static str] = &["ADCore"];

    /// Create a simple descriptor; `max_memory` defaults to 0
    pub fn simple(port: impl Into<String>, max_memory: Option<i64>) -> Result<Self, ValidationError> {
        let port = validate_port(port.into())?;
        Ok(Self {
            variant: Variant::Simple,
            config: DescriptorConfig {
                port,
                max_buffers: 0,
                max_memory: max_memory.unwrap_or(DEFAULT_SIMPLE_MEMORY),
                driver_reference: None,
            },
        })
    }

    /// Create an extended descriptor
    ///
    /// Defaults: 50 buffers, -1 memory, driver reference [`DEFAULT_DRIVER_REFERENCE`].
    pub fn extended(
        port: impl Into<String>,
        max_buffers: Option<i64>,
        max_memory: Option<i64>,
        driver_reference: Option<String>,
    ) -> Result<Self, ValidationError> {
        let port = validate_port(port.into())?;
        let max_buffers = match max_buffers {
            Some(value) if value < 0 => {
                return Err(ValidationError::Negative {
                    field: ARG_BUFFERS,
                    value,
                })
            }
            Some(value) => u32::try_from(value).map_err(|_| ValidationError::OutOfRange {
                field: ARG_BUFFERS,
                value,
            })?,
            None => DEFAULT_EXTENDED_BUFFERS,
        };
        let driver_reference = match driver_reference {
            Some(reference) if reference.trim().is_empty() => {
                return Err(ValidationError::Empty { field: ARG_DRIVER })
            }
            Some(reference) => reference,
            None => DEFAULT_DRIVER_REFERENCE.to_string(),
        };

        Ok(Self {
            variant: Variant::Extended,
            config: DescriptorConfig {
                port,
                max_buffers,
                max_memory: max_memory.unwrap_or(DEFAULT_EXTENDED_MEMORY),
                driver_reference: Some(driver_reference),
            },
        })
    }

    /// Create a descriptor from untyped declaration arguments
    pub fn from_args(variant: Variant, args: &ArgMap) -> Result<Self, ValidationError> {
        if let Some(name) = args.keys().find(|name| !variant.accepts(name)) {
            return Err(ValidationError::UnknownArgument(name.clone(), variant));
        }

        let port = args
            .get(ARG_PORT)
            .ok_or(ValidationError::MissingArgument(ARG_PORT))?
            .as_string(ARG_PORT)?;
        let max_memory = args
            .get(ARG_MEMORY)
            .map(|v| v.as_integer(ARG_MEMORY))
            .transpose()?;

        match variant {
            Variant::Simple => {
                if args.contains_key(ARG_BUFFERS) {
                    debug!(port = %port, "Ignoring BUFFERS, the simple variant always renders 0");
                }
                Self::simple(port, max_memory)
            }
            Variant::Extended => {
                let max_buffers = args
                    .get(ARG_BUFFERS)
                    .map(|v| v.as_integer(ARG_BUFFERS))
                    .transpose()?;
                let driver_reference = args
                    .get(ARG_DRIVER)
                    .map(|v| v.as_string(ARG_DRIVER))
                    .transpose()?;
                Self::extended(port, max_buffers, max_memory, driver_reference)
            }
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    pub fn port(&self) -> &str {
        &self.config.port
    }

    pub fn max_buffers(&self) -> u32 {
        self.config.max_buffers
    }

    pub fn max_memory(&self) -> i64 {
        self.config.max_memory
    }

    pub fn driver_reference(&self) -> Option<&str> {
        self.config.driver_reference.as_deref()
    }

    /// The init command line alone, without the comment
    pub fn render_init_line(&self) -> String {
        let c = &self.config;
        match self.variant {
            Variant::Simple => format!(
                "{}( {:>10}, 0, {:>9} )",
                Self::COMMAND_NAME,
                c.port,
                c.max_memory
            ),
            Variant::Extended => format!(
                "{}( {:>10}, {:>10}, {:>9} )",
                Self::COMMAND_NAME,
                c.port,
                c.max_buffers,
                c.max_memory
            ),
        }
    }

    /// The parameter-order comment followed by the init command line
    pub fn render_init_command(&self) -> String {
        format!("{}\n{}", Self::INIT_COMMENT, self.render_init_line())
    }

    pub fn library_files() -> &'static [&'static str] {
        Self::LIB_FILES
    }

    pub fn support_files() -> &'static [&'static str] {
        Self::DBD_FILES
    }

    /// Static description of everything a build needs to know about a variant
    pub fn manifest(variant: Variant) -> Manifest {
        Manifest {
            variant,
            command: Self::COMMAND_NAME,
            arguments: variant.arg_info(),
            template_arguments: TEMPLATE_ARGS,
            libraries: Self::LIB_FILES,
            support_files: Self::DBD_FILES,
            dependencies: Self::DEPENDENCIES,
            template_files: TEMPLATE_FILES,
            driver_parameters: DRIVER_PARAMETERS,
        }
    }
}

/// Serializable summary of a variant's static metadata
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub variant: Variant,
    pub command: &'static str,
    pub arguments: &'static [ArgInfo],
    pub template_arguments: &'static [ArgInfo],
    pub libraries: &'static [&'static str],
    pub support_files: &'static [&'static str],
    pub dependencies: &'static [&'static str],
    pub template_files: &'static [&'static str],
    pub driver_parameters: &'static [DriverParameter],
}

impl Manifest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn validate_port(port: String) -> Result<String, ValidationError> {
    if port.trim().is_empty() {
        return Err(ValidationError::EmptyPort);
    }
    // Anything here would split or unbalance the iocsh argument list
    if port
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ',' | '(' | ')' | '"' | '\''))
    {
        return Err(ValidationError::InvalidPort(port));
    }
    Ok(port)
}
