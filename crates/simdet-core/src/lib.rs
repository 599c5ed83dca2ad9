//! simdet Core - Device descriptors and startup script assembly
//!
//! This crate provides the device definition of the simulated HDF5 detector
//! for IOC configuration builds:
//! - Descriptor construction, validation and init command rendering
//! - Argument metadata and untyped declaration values
//! - Template instance records and substitutions text
//! - Declaration loading from TOML and builder component XML
//! - Startup script assembly with unique-port enforcement

pub mod args;
pub mod declaration;
pub mod descriptor;
pub mod error;
pub mod script;
pub mod template;

pub use args::{ArgInfo, ArgKind, ArgMap, ArgValue};
pub use declaration::{DeclarationError, DeclarationSet, DeviceDeclaration};
pub use descriptor::{Descriptor, DescriptorConfig, Manifest, Variant};
pub use error::ValidationError;
pub use script::{BuildError, StartupScript};
pub use template::{TemplateArgs, TemplateDefaults, TemplateInstance};
