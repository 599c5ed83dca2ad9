//! Template instance records bound to each detector
//!
//! Every detector is paired with the areaDetector base template and the
//! driver's own template. Expanding those templates into records is the
//! host's job; this module only produces the instance records and their
//! substitutions-file text.

use serde::{Deserialize, Serialize};

use crate::args::{ArgMap, ARG_ADDR, ARG_P, ARG_PORT, ARG_R, ARG_TIMEOUT};
use crate::descriptor::Descriptor;
use crate::error::ValidationError;

/// Templates instantiated for every detector, in load order
pub const TEMPLATE_FILES: &[&str] = &["ADBase.template", "simHDF5Detector.template"];

pub const DEFAULT_ADDR: u32 = 0;
pub const DEFAULT_TIMEOUT: u32 = 1;

/// Asyn parameter interface type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AsynParamType {
    Int32,
    Octet,
}

/// A driver parameter exposed through `simHDF5Detector.template`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverParameter {
    pub name: &'static str,
    pub kind: AsynParamType,
}

const fn param(name: &'static str, kind: AsynParamType) -> DriverParameter {
    DriverParameter { name, kind }
}

/// Parameters the driver registers, in creation order
pub const DRIVER_PARAMETERS: &[DriverParameter] = &[
    param("ADSim_Filename", AsynParamType::Octet),
    param("ADSim_FileValid", AsynParamType::Int32),
    param("ADSim_LoadFile", AsynParamType::Int32),
    param("ADSim_NumOfDsets", AsynParamType::Int32),
    param("ADSim_DsetIndex", AsynParamType::Int32),
    param("ADSim_DsetName", AsynParamType::Octet),
    param("ADSim_DsetNumDims", AsynParamType::Int32),
    param("ADSim_DsetDim1", AsynParamType::Int32),
    param("ADSim_DsetDim2", AsynParamType::Int32),
    param("ADSim_DsetDim3", AsynParamType::Int32),
    param("ADSim_DsetDim4", AsynParamType::Int32),
    param("ADSim_DsetDim5", AsynParamType::Int32),
    param("ADSim_DsetDim6", AsynParamType::Int32),
    param("ADSim_XDim", AsynParamType::Int32),
    param("ADSim_YDim", AsynParamType::Int32),
    param("ADSim_DsetPath", AsynParamType::Octet),
];

/// Build-wide fallbacks for template macros a declaration leaves out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefaults {
    #[serde(default)]
    pub p: Option<String>,
    #[serde(default)]
    pub r: Option<String>,
    #[serde(default)]
    pub addr: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT
}

impl Default for TemplateDefaults {
    fn default() -> Self {
        Self {
            p: None,
            r: None,
            addr: DEFAULT_ADDR,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Macros of the areaDetector base template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateArgs {
    /// PV prefix
    pub p: String,
    /// Record suffix
    pub r: String,
    pub addr: u32,
    pub timeout: u32,
}

impl TemplateArgs {
    pub fn new(p: impl Into<String>, r: impl Into<String>) -> Result<Self, ValidationError> {
        let p = p.into();
        let r = r.into();
        if p.is_empty() {
            return Err(ValidationError::Empty { field: ARG_P });
        }
        if r.is_empty() {
            return Err(ValidationError::Empty { field: ARG_R });
        }
        Ok(Self {
            p,
            r,
            addr: DEFAULT_ADDR,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Pick template macros out of a declaration's arguments.
    ///
    /// Returns `Ok(None)` when neither the declaration nor the defaults
    /// mention `P` or `R`: the device is then emitted without templates.
    pub fn from_args(args: &ArgMap, defaults: &TemplateDefaults) -> Result<Option<Self>, ValidationError> {
        let p = string_arg(args, ARG_P)?.or_else(|| defaults.p.clone());
        let r = string_arg(args, ARG_R)?.or_else(|| defaults.r.clone());

        let (p, r) = match (p, r) {
            (None, None) => return Ok(None),
            (Some(p), Some(r)) => (p, r),
            (None, Some(_)) => return Err(ValidationError::MissingArgument(ARG_P)),
            (Some(_), None) => return Err(ValidationError::MissingArgument(ARG_R)),
        };

        let mut template = Self::new(p, r)?;
        template.addr = unsigned_arg(args, ARG_ADDR)?.unwrap_or(defaults.addr);
        template.timeout = unsigned_arg(args, ARG_TIMEOUT)?.unwrap_or(defaults.timeout);
        Ok(Some(template))
    }
}

fn string_arg(args: &ArgMap, field: &'static str) -> Result<Option<String>, ValidationError> {
    args.get(field).map(|v| v.as_string(field)).transpose()
}

fn unsigned_arg(args: &ArgMap, field: &'static str) -> Result<Option<u32>, ValidationError> {
    let Some(value) = args.get(field) else {
        return Ok(None);
    };
    let value = value.as_integer(field)?;
    if value < 0 {
        return Err(ValidationError::Negative { field, value });
    }
    u32::try_from(value)
        .map(Some)
        .map_err(|_| ValidationError::OutOfRange { field, value })
}

/// One instantiation of a template file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInstance {
    pub file: &'static str,
    /// Macro name and value pairs, in pattern order
    pub macros: Vec<(&'static str, String)>,
}

/// Instance records binding a descriptor to every template in [`TEMPLATE_FILES`]
pub fn template_instances(descriptor: &Descriptor, args: &TemplateArgs) -> Vec<TemplateInstance> {
    let macros = vec![
        (ARG_P, args.p.clone()),
        (ARG_R, args.r.clone()),
        (ARG_PORT, descriptor.port().to_string()),
        (ARG_ADDR, args.addr.to_string()),
        (ARG_TIMEOUT, args.timeout.to_string()),
    ];
    TEMPLATE_FILES
        .iter()
        .copied()
        .map(|file| TemplateInstance {
            file,
            macros: macros.clone(),
        })
        .collect()
}

/// Render instances as EPICS substitutions-file text, grouped per template file
pub fn render_substitutions(instances: &[TemplateInstance]) -> String {
    let mut files: Vec<&'static str> = Vec::new();
    for instance in instances {
        if !files.contains(&instance.file) {
            files.push(instance.file);
        }
    }

    let mut out = String::new();
    for file in files {
        let group: Vec<&TemplateInstance> = instances.iter().filter(|i| i.file == file).collect();
        let names: Vec<&str> = group[0].macros.iter().map(|(name, _)| *name).collect();

        out.push_str(&format!("file {}\n{{\n", file));
        out.push_str(&format!("pattern {{ {} }}\n", names.join(", ")));
        for instance in group {
            let values: Vec<String> = instance
                .macros
                .iter()
                .map(|(_, value)| format!("\"{}\"", value.replace('"', "\\\"")))
                .collect();
            out.push_str(&format!("    {{ {} }}\n", values.join(", ")));
        }
        out.push_str("}\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgValue;

    #[test]
    fn test_template_args_from_declaration() {
        let mut args = ArgMap::new();
        args.insert("P".to_string(), ArgValue::from("BL01:"));
        args.insert("R".to_string(), ArgValue::from("DET1:"));
        args.insert("TIMEOUT".to_string(), ArgValue::from("5"));

        let template = TemplateArgs::from_args(&args, &TemplateDefaults::default())
            .unwrap()
            .unwrap();
        assert_eq!(template.p, "BL01:");
        assert_eq!(template.addr, 0);
        assert_eq!(template.timeout, 5);
    }

    #[test]
    fn test_template_args_fall_back_to_defaults() {
        let defaults = TemplateDefaults {
            p: Some("SIM:".to_string()),
            r: Some("CAM:".to_string()),
            addr: 2,
            timeout: 3,
        };
        let template = TemplateArgs::from_args(&ArgMap::new(), &defaults).unwrap().unwrap();
        assert_eq!(template.r, "CAM:");
        assert_eq!(template.addr, 2);

        assert_eq!(
            TemplateArgs::from_args(&ArgMap::new(), &TemplateDefaults::default()),
            Ok(None)
        );
    }

    #[test]
    fn test_template_args_errors() {
        let mut args = ArgMap::new();
        args.insert("P".to_string(), ArgValue::from("SIM:"));
        assert_eq!(
            TemplateArgs::from_args(&args, &TemplateDefaults::default()),
            Err(ValidationError::MissingArgument(ARG_R))
        );

        args.insert("R".to_string(), ArgValue::from(""));
        assert_eq!(
            TemplateArgs::from_args(&args, &TemplateDefaults::default()),
            Err(ValidationError::Empty { field: ARG_R })
        );

        args.insert("R".to_string(), ArgValue::from("CAM:"));
        args.insert("ADDR".to_string(), ArgValue::Int(-1));
        assert_eq!(
            TemplateArgs::from_args(&args, &TemplateDefaults::default()),
            Err(ValidationError::Negative {
                field: ARG_ADDR,
                value: -1
            })
        );
    }

    #[test]
    fn test_render_substitutions_groups_by_file() {
        let template = TemplateArgs::new("SIM:", "CAM:").unwrap();
        let cam1 = Descriptor::simple("CAM1", None).unwrap();
        let cam2 = Descriptor::simple("CAM2", None).unwrap();

        let mut instances = template_instances(&cam1, &template);
        instances.extend(template_instances(&cam2, &template));
        assert_eq!(instances.len(), 4);

        let text = render_substitutions(&instances);
        let expected = "\
file ADBase.template
{
pattern { P, R, PORT, ADDR, TIMEOUT }
    { \"SIM:\", \"CAM:\", \"CAM1\", \"0\", \"1\" }
    { \"SIM:\", \"CAM:\", \"CAM2\", \"0\", \"1\" }
}

file simHDF5Detector.template
{
pattern { P, R, PORT, ADDR, TIMEOUT }
    { \"SIM:\", \"CAM:\", \"CAM1\", \"0\", \"1\" }
    { \"SIM:\", \"CAM:\", \"CAM2\", \"0\", \"1\" }
}

";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_driver_parameters_unique() {
        let mut names: Vec<&str> = DRIVER_PARAMETERS.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DRIVER_PARAMETERS.len());
    }
}
