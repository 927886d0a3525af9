use super::info::ModuleInfo;
use super::kinds::BaseKind;
use crate::core::error::{CoreException, ErrorKind};
use crate::core::options::{OptionError, OptionMap, OptionType, OptionValue, Scalar, ValidatorSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the manifest at the root of every supermodule directory.
pub const MANIFEST_FILE: &str = "manifest.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse manifest of '{supermodule}': {source}")]
    Parse {
        supermodule: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Module '{module}' declares unknown base kind '{base}'")]
    UnknownBase { module: String, base: String },
    #[error("Option '{option}' of module '{module}' has unknown type '{ty}'")]
    BadOptionType {
        module: String,
        option: String,
        ty: String,
    },
    #[error("Default of option '{option}' of module '{module}' is not a {ty}")]
    BadDefault {
        module: String,
        option: String,
        ty: String,
    },
    #[error("Module '{module}' has an invalid declaration: {reason}")]
    InvalidInfo { module: String, reason: String },
    #[error("Invalid option declaration in module '{module}': {source}")]
    Option {
        module: String,
        #[source]
        source: OptionError,
    },
    #[error("Supermodule '{supermodule}' does not provide module '{module}'")]
    UnknownModule { supermodule: String, module: String },
    #[error("Supermodule '{supermodule}' not found in any search path")]
    NotFound {
        supermodule: String,
        searched: Vec<PathBuf>,
    },
}

impl ManifestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Parse { .. } | Self::UnknownModule { .. } => {
                ErrorKind::SupermoduleLoad
            }
            Self::UnknownBase { .. }
            | Self::BadOptionType { .. }
            | Self::BadDefault { .. }
            | Self::InvalidInfo { .. } => ErrorKind::InvalidInfo,
            Self::Option { source, .. } => source.kind(),
            Self::NotFound { .. } => ErrorKind::SupermoduleNotFound,
        }
    }
}

impl From<ManifestError> for CoreException {
    fn from(err: ManifestError) -> Self {
        let ex = CoreException::new(err.kind(), err.to_string());
        match err {
            ManifestError::Io { path, .. } => ex.with("path", path.display()),
            ManifestError::Parse { supermodule, .. } => ex.with("supermodule", supermodule),
            ManifestError::UnknownBase { module, base } => {
                ex.with("module", module).with("base", base)
            }
            ManifestError::BadOptionType { module, option, ty }
            | ManifestError::BadDefault { module, option, ty } => ex
                .with("module", module)
                .with("option", option)
                .with("type", ty),
            ManifestError::InvalidInfo { module, .. } => ex.with("module", module),
            ManifestError::Option { module, source } => ex
                .with("module", module)
                .with("option", source.option_name()),
            ManifestError::UnknownModule {
                supermodule,
                module,
            } => ex.with("supermodule", supermodule).with("module", module),
            ManifestError::NotFound {
                supermodule,
                searched,
            } => searched.iter().fold(ex.with("supermodule", supermodule), |ex, p| {
                ex.with("searched", p.display())
            }),
        }
    }
}

/// Module declarations of one supermodule.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub supermodule: String,
    /// Directory the supermodule was found in.
    pub path: PathBuf,
    pub modules: BTreeMap<String, ModuleInfo>,
}

impl Manifest {
    /// Parses manifest text.
    ///
    /// Every `[modules.<name>]` table becomes a [`ModuleInfo`] whose options are the
    /// declared ones plus the defaults of its base kind.
    pub fn parse(supermodule: &str, path: &Path, content: &str) -> Result<Self, ManifestError> {
        let file: ManifestFile = toml::from_str(content).map_err(|source| ManifestError::Parse {
            supermodule: supermodule.to_string(),
            source,
        })?;
        let path_text = path.display().to_string();
        let modules = file
            .modules
            .into_iter()
            .map(|(name, def)| {
                let info = def.into_info(&name, &path_text)?;
                Ok((name, info))
            })
            .collect::<Result<_, ManifestError>>()?;
        Ok(Self {
            supermodule: supermodule.to_string(),
            path: path.to_path_buf(),
            modules,
        })
    }

    /// Reads `<dir>/manifest.toml`.
    pub fn from_dir(supermodule: &str, dir: &Path) -> Result<Self, ManifestError> {
        let file = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&file).map_err(|source| ManifestError::Io {
            path: file.clone(),
            source,
        })?;
        Self::parse(supermodule, dir, &content)
    }

    pub fn module(&self, name: &str) -> Result<&ModuleInfo, ManifestError> {
        self.modules
            .get(name)
            .ok_or_else(|| ManifestError::UnknownModule {
                supermodule: self.supermodule.clone(),
                module: name.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    modules: BTreeMap<String, ModuleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ModuleDef {
    language: String,
    base: String,
    #[serde(default)]
    modpath: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    refs: Vec<String>,
    #[serde(default)]
    options: BTreeMap<String, OptionDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct OptionDef {
    #[serde(rename = "type")]
    ty: String,
    default: Option<toml::Value>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    help: String,
    validator: Option<ValidatorDef>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
enum ValidatorDef {
    RangeCheck {
        min: f64,
        max: f64,
        #[serde(default = "yes")]
        inc_min: bool,
        #[serde(default = "yes")]
        inc_max: bool,
    },
    GreaterThan {
        min: f64,
        #[serde(default)]
        inclusive: bool,
    },
    LessThan {
        max: f64,
        #[serde(default)]
        inclusive: bool,
    },
    InList {
        values: Vec<toml::Value>,
    },
}

fn yes() -> bool {
    true
}

impl ModuleDef {
    fn into_info(self, name: &str, path: &str) -> Result<ModuleInfo, ManifestError> {
        let base: BaseKind = self.base.parse().map_err(|_| ManifestError::UnknownBase {
            module: name.to_string(),
            base: self.base.clone(),
        })?;
        let mut options = OptionMap::new();
        for (option, def) in self.options {
            def.declare(name, &option, &mut options)?;
        }
        let info = ModuleInfo {
            name: name.to_string(),
            language: self.language,
            base,
            path: path.to_string(),
            modpath: self.modpath,
            version: self.version,
            description: self.description,
            authors: self.authors,
            refs: self.refs,
            options,
        }
        .with_base_options();
        info.validate().map_err(|e| ManifestError::InvalidInfo {
            module: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(info)
    }
}

impl OptionDef {
    fn declare(self, module: &str, option: &str, options: &mut OptionMap) -> Result<(), ManifestError> {
        let ty: OptionType = self.ty.parse().map_err(|_| ManifestError::BadOptionType {
            module: module.to_string(),
            option: option.to_string(),
            ty: self.ty.clone(),
        })?;
        let default = match &self.default {
            Some(raw) => Some(OptionValue::from_toml(raw, ty).ok_or_else(|| {
                ManifestError::BadDefault {
                    module: module.to_string(),
                    option: option.to_string(),
                    ty: ty.to_string(),
                }
            })?),
            None => None,
        };
        let validator = match self.validator {
            Some(def) => Some(def.into_spec(module, option)?.build()),
            None => None,
        };
        options
            .add_option(option, ty, self.required, validator, self.help, default)
            .map_err(|source| ManifestError::Option {
                module: module.to_string(),
                source,
            })
    }
}

impl ValidatorDef {
    fn into_spec(self, module: &str, option: &str) -> Result<ValidatorSpec, ManifestError> {
        Ok(match self {
            Self::RangeCheck {
                min,
                max,
                inc_min,
                inc_max,
            } => ValidatorSpec::RangeCheck {
                min,
                max,
                inc_min,
                inc_max,
            },
            Self::GreaterThan { min, inclusive } => ValidatorSpec::GreaterThan { min, inclusive },
            Self::LessThan { max, inclusive } => ValidatorSpec::LessThan { max, inclusive },
            Self::InList { values } => {
                let values = values
                    .iter()
                    .map(|v| match v {
                        toml::Value::Integer(i) => Some(Scalar::Int(*i)),
                        toml::Value::Float(x) => Some(Scalar::Float(*x)),
                        toml::Value::Boolean(b) => Some(Scalar::Bool(*b)),
                        toml::Value::String(s) => Some(Scalar::String(s.clone())),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| ManifestError::InvalidInfo {
                        module: module.to_string(),
                        reason: format!("validator of '{}' lists a non-scalar value", option),
                    })?;
                ValidatorSpec::InList { values }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
        [modules.SCF]
        language = "c_module"
        base = "EnergyMethod"
        modpath = "libscf.so"
        version = "1.2"
        authors = ["A. Author"]

        [modules.SCF.options.MAX_ITER]
        type = "Int"
        default = 50
        validator = { kind = "greater-than", min = 0 }

        [modules.SCF.options.GUESS]
        type = "String"
        default = "core"
        validator = { kind = "in-list", values = ["core", "sad"] }

        [modules.SCF.options.BASIS]
        type = "String"
        required = true
        help = "Label of the primary basis"

        [modules.Frag]
        language = "python_module"
        base = "SystemFragmenter"
    "#;

    #[test]
    fn parses_modules_and_options() {
        let manifest = Manifest::parse("scf", Path::new("/opt/scf"), MANIFEST).unwrap();
        assert_eq!(manifest.modules.len(), 2);
        let scf = manifest.module("SCF").unwrap();
        assert_eq!(scf.base, BaseKind::EnergyMethod);
        assert_eq!(scf.path, "/opt/scf");
        assert_eq!(scf.options.get_int("MAX_ITER"), Ok(50));
        assert_eq!(scf.options.missing_required(), vec!["BASIS".to_string()]);
        assert!(scf.options.has_key("FDIFF_DISPLACEMENT"));

        let mut options = scf.options.clone();
        assert!(options.change("GUESS", "huckel").is_err());
        assert!(options.change("MAX_ITER", 0_i64).is_err());
    }

    #[test]
    fn unknown_module_and_base_are_reported() {
        let manifest = Manifest::parse("scf", Path::new("/opt/scf"), MANIFEST).unwrap();
        let err: CoreException = manifest.module("MP2").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::SupermoduleLoad);
        assert_eq!(err.info_value("module"), Some("MP2"));

        let bad = "[modules.X]\nlanguage = \"lambda\"\nbase = \"Integral\"\n";
        let err = Manifest::parse("x", Path::new("/x"), bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInfo);
    }

    #[test]
    fn default_must_match_declared_type() {
        let bad = r#"
            [modules.X]
            language = "python_module"
            base = "TestModule"
            [modules.X.options.N]
            type = "Int"
            default = "many"
        "#;
        let err = Manifest::parse("x", Path::new("/x"), bad).unwrap_err();
        assert!(matches!(err, ManifestError::BadDefault { .. }));
    }

    #[test]
    fn missing_modpath_invalidates_native_modules() {
        let bad = "[modules.X]\nlanguage = \"c_module\"\nbase = \"TestModule\"\n";
        let err = Manifest::parse("x", Path::new("/x"), bad).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidInfo { .. }));
    }

    #[test]
    fn reads_from_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), MANIFEST).unwrap();
        let manifest = Manifest::from_dir("scf", dir.path()).unwrap();
        assert_eq!(manifest.path, dir.path());
        let err = Manifest::from_dir("scf", &dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SupermoduleLoad);
    }
}
