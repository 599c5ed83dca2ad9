//! Startup script assembly
//!
//! [`StartupScript`] plays the host's part of the contract: it collects
//! descriptors in declaration order, enforces unique ports and writes the
//! init commands together with the libraries and support files they need.

use std::io::Write;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::declaration::DeclarationSet;
use crate::descriptor::{Descriptor, Variant, DEFAULT_DRIVER_REFERENCE};
use crate::error::ValidationError;
use crate::template::{render_substitutions, template_instances, TemplateArgs, TemplateDefaults, TemplateInstance};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Duplicate PORT '{0}': every device in a build needs a unique port")]
    DuplicatePort(String),
    #[error("Device {index} (PORT={port}): {source}")]
    Device {
        index: usize,
        port: String,
        source: ValidationError,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Ordered collection of descriptors making up one generated script
#[derive(Debug, Clone, Default)]
pub struct StartupScript {
    devices: Vec<Descriptor>,
    templates: Vec<TemplateInstance>,
}

impl StartupScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build descriptors and template records for every declaration
    pub fn from_declarations(
        declarations: &DeclarationSet,
        default_variant: Variant,
        defaults: &TemplateDefaults,
    ) -> Result<Self, BuildError> {
        let mut script = Self::new();

        for (index, declaration) in declarations.devices.iter().enumerate() {
            let device_error = |source| BuildError::Device {
                index,
                port: declaration.port().unwrap_or("<missing>").to_string(),
                source,
            };

            let variant = declaration.variant_or(default_variant);
            let descriptor = Descriptor::from_args(variant, &declaration.args).map_err(device_error)?;
            let template = TemplateArgs::from_args(&declaration.args, defaults).map_err(device_error)?;

            match template {
                Some(template) => script.add_with_template(descriptor, &template)?,
                None => {
                    debug!(port = descriptor.port(), "No P/R macros, emitting device without templates");
                    script.add(descriptor)?;
                }
            }
        }

        info!(
            devices = script.devices.len(),
            templates = script.templates.len(),
            "Assembled startup script"
        );
        Ok(script)
    }

    /// Append a descriptor; its port must not be taken yet
    pub fn add(&mut self, descriptor: Descriptor) -> Result<(), BuildError> {
        if self.devices.iter().any(|d| d.port() == descriptor.port()) {
            return Err(BuildError::DuplicatePort(descriptor.port().to_string()));
        }

        if let Some(reference) = descriptor.driver_reference() {
            if reference != DEFAULT_DRIVER_REFERENCE && !self.devices.iter().any(|d| d.port() == reference) {
                warn!(
                    port = descriptor.port(),
                    driver = reference,
                    "Driver reference does not name a port declared earlier in this build"
                );
            }
        }

        debug!(port = descriptor.port(), variant = %descriptor.variant(), "Added device");
        self.devices.push(descriptor);
        Ok(())
    }

    /// Append a descriptor along with its template instance records
    pub fn add_with_template(&mut self, descriptor: Descriptor, template: &TemplateArgs) -> Result<(), BuildError> {
        let instances = template_instances(&descriptor, template);
        self.add(descriptor)?;
        self.templates.extend(instances);
        Ok(())
    }

    pub fn devices(&self) -> &[Descriptor] {
        &self.devices
    }

    pub fn templates(&self) -> &[TemplateInstance] {
        &self.templates
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Native libraries required by the declared devices
    pub fn libraries(&self) -> Vec<&'static str> {
        self.collect_static(|_| Descriptor::library_files())
    }

    /// Database definition files required by the declared devices
    pub fn support_files(&self) -> Vec<&'static str> {
        self.collect_static(|_| Descriptor::support_files())
    }

    /// Support modules required by the declared devices
    pub fn dependencies(&self) -> Vec<&'static str> {
        self.collect_static(|_| Descriptor::DEPENDENCIES)
    }

    fn collect_static(&self, files: impl Fn(&Descriptor) -> &'static [&'static str]) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for file in self.devices.iter().flat_map(files) {
            if !out.contains(file) {
                out.push(*file);
            }
        }
        out
    }

    /// Full script text
    pub fn render(&self) -> String {
        let mut out = String::from("# SimHDF5Detector startup commands\n");
        for (label, items) in [
            ("Support modules", self.dependencies()),
            ("Libraries", self.libraries()),
            ("Support files", self.support_files()),
        ] {
            if !items.is_empty() {
                out.push_str(&format!("# {}: {}\n", label, items.join(" ")));
            }
        }

        for descriptor in &self.devices {
            out.push('\n');
            out.push_str(&descriptor.render_init_command());
            out.push('\n');
        }
        out
    }

    /// Write the script to a caller-supplied sink
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), BuildError> {
        out.write_all(self.render().as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Substitutions-file text for all template records
    pub fn render_substitutions(&self) -> String {
        render_substitutions(&self.templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_script() {
        let mut script = StartupScript::new();
        script.add(Descriptor::simple("DET1", None).unwrap()).unwrap();
        script
            .add(Descriptor::extended("CAM1", Some(50), Some(-1), None).unwrap())
            .unwrap();

        let expected = "\
# SimHDF5Detector startup commands
# Support modules: ADCore
# Libraries: simHDF5Detector
# Support files: simHDF5Support

# SimHDF5DetectorConfig(portName, maxBuffers, maxMemory )
SimHDF5DetectorConfig(       DET1, 0,         0 )

# SimHDF5DetectorConfig(portName, maxBuffers, maxMemory )
SimHDF5DetectorConfig(       CAM1,         50,        -1 )
";
        assert_eq!(script.render(), expected);
    }

    #[test]
    fn test_empty_script_has_no_requirements() {
        let script = StartupScript::new();
        assert!(script.is_empty());
        assert!(script.libraries().is_empty());
        assert_eq!(script.render(), "# SimHDF5Detector startup commands\n");
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let mut script = StartupScript::new();
        script.add(Descriptor::simple("CAM1", None).unwrap()).unwrap();
        let err = script
            .add(Descriptor::extended("CAM1", None, None, None).unwrap())
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicatePort(ref p) if p == "CAM1"));
        assert_eq!(script.devices().len(), 1);
    }

    #[test]
    fn test_metadata_deduplicated() {
        let mut script = StartupScript::new();
        for port in ["A", "B", "C"] {
            script.add(Descriptor::simple(port, None).unwrap()).unwrap();
        }
        assert_eq!(script.libraries(), ["simHDF5Detector"]);
        assert_eq!(script.support_files(), ["simHDF5Support"]);
        assert_eq!(script.dependencies(), ["ADCore"]);
    }

    #[test]
    fn test_write_to_sink() {
        let mut script = StartupScript::new();
        script.add(Descriptor::simple("DET1", Some(-1)).unwrap()).unwrap();

        let mut sink = Vec::new();
        script.write_to(&mut sink).unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), script.render());
    }

    #[test]
    fn test_from_declarations() {
        let set = DeclarationSet::from_toml(
            r#"
[[device]]
PORT = "SIM1"
P = "BL01:"
R = "SIM1:"

[[device]]
variant = "extended"
PORT = "CAM1"
DRIVER = "SIM1"
"#,
        )
        .unwrap();

        let defaults = TemplateDefaults {
            p: Some("BL01:".to_string()),
            r: Some("CAM1:".to_string()),
            ..TemplateDefaults::default()
        };
        let script = StartupScript::from_declarations(&set, Variant::Simple, &defaults).unwrap();

        assert_eq!(script.devices().len(), 2);
        assert_eq!(script.devices()[0].variant(), Variant::Simple);
        assert_eq!(script.devices()[1].driver_reference(), Some("SIM1"));
        assert_eq!(script.templates().len(), 4);
        assert!(script.render_substitutions().contains("\"CAM1:\", \"CAM1\""));
    }

    #[test]
    fn test_from_declarations_reports_failing_device() {
        let set = DeclarationSet::from_toml(
            r#"
[[device]]
PORT = "OK1"

[[device]]
variant = "extended"
PORT = "BAD"
BUFFERS = -3
"#,
        )
        .unwrap();

        let err = StartupScript::from_declarations(&set, Variant::Simple, &TemplateDefaults::default())
            .unwrap_err();
        match err {
            BuildError::Device { index, port, source } => {
                assert_eq!(index, 1);
                assert_eq!(port, "BAD");
                assert_eq!(
                    source,
                    ValidationError::Negative {
                        field: "BUFFERS",
                        value: -3
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_demo_declarations_render_identically() {
        let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        let defaults = TemplateDefaults::default();

        let scripts: Vec<StartupScript> = ["ioc.toml", "ioc.xml"]
            .iter()
            .map(|name| {
                let set = DeclarationSet::from_file(&demos.join(name)).unwrap();
                StartupScript::from_declarations(&set, Variant::Simple, &defaults).unwrap()
            })
            .collect();

        assert_eq!(scripts[0].render(), scripts[1].render());
        assert_eq!(scripts[0].render_substitutions(), scripts[1].render_substitutions());
        assert!(scripts[0]
            .render()
            .contains("SimHDF5DetectorConfig(       CAM1,         50,        -1 )"));
    }

    #[test]
    fn test_default_variant_applies() {
        let set = DeclarationSet::from_toml("[[device]]\nPORT = \"CAM1\"\n").unwrap();
        let script =
            StartupScript::from_declarations(&set, Variant::Extended, &TemplateDefaults::default()).unwrap();
        assert_eq!(
            script.devices()[0].render_init_line(),
            "SimHDF5DetectorConfig(       CAM1,         50,        -1 )"
        );
    }
}
