use super::kinds::BaseKind;
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use crate::core::options::OptionMap;
use crate::core::serialize::Serializable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Language of supermodules compiled into shared objects (or into this binary).
pub const LANGUAGE_NATIVE: &str = "c_module";
/// Language of supermodules implemented in an embedded scripting runtime.
pub const LANGUAGE_PYTHON: &str = "python_module";
/// Language of modules registered at runtime from a closure.
pub const LANGUAGE_LAMBDA: &str = "lambda";

/// Static description of a loadable module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub language: String,
    pub base: BaseKind,
    /// Directory (or identifier) of the supermodule providing the module.
    pub path: String,
    /// Shared-object file within `path`; required for native modules.
    pub modpath: String,
    pub version: String,
    pub description: String,
    pub authors: Vec<String>,
    pub refs: Vec<String>,
    /// Declared options, including the defaults of the base kind.
    pub options: OptionMap,
}

impl ModuleInfo {
    pub fn new(
        name: impl Into<String>,
        language: impl Into<String>,
        base: BaseKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            base,
            path: path.into(),
            modpath: String::new(),
            version: String::new(),
            description: String::new(),
            authors: Vec::new(),
            refs: Vec::new(),
            options: OptionMap::new(),
        }
    }

    pub fn with_modpath(mut self, modpath: impl Into<String>) -> Self {
        self.modpath = modpath.into();
        self
    }

    pub fn with_options(mut self, options: OptionMap) -> Self {
        self.options = options;
        self
    }

    /// Adds the options of the base kind that the module does not declare itself.
    pub fn with_base_options(mut self) -> Self {
        self.options.merge_missing(&self.base.default_options());
        self
    }

    /// Checks the fields every loader relies on.
    pub fn validate(&self) -> CoreResult<()> {
        let missing = [
            ("name", self.name.is_empty()),
            ("language", self.language.is_empty()),
            ("path", self.path.is_empty()),
            (
                "modpath",
                self.language == LANGUAGE_NATIVE && self.modpath.is_empty(),
            ),
        ];
        if let Some((field, _)) = missing.iter().find(|(_, empty)| *empty) {
            return Err(CoreException::new(ErrorKind::InvalidInfo, "Module information is incomplete")
                .with("name", &self.name)
                .with("field", field));
        }
        self.options
            .validate_all()
            .map_err(|e| CoreException::from(e).with("name", &self.name))
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name:        {}", self.name)?;
        writeln!(f, "Version:     {}", self.version)?;
        writeln!(f, "Base:        {}", self.base)?;
        writeln!(f, "Language:    {}", self.language)?;
        writeln!(f, "Path:        {}", self.path)?;
        if !self.modpath.is_empty() {
            writeln!(f, "Modpath:     {}", self.modpath)?;
        }
        if !self.description.is_empty() {
            writeln!(f, "Description: {}", self.description)?;
        }
        if !self.authors.is_empty() {
            writeln!(f, "Authors:     {}", self.authors.join(", "))?;
        }
        for r in &self.refs {
            writeln!(f, "Reference:   {}", r)?;
        }
        if !self.options.is_empty() {
            writeln!(f, "Options:")?;
            write!(f, "{}", self.options)?;
        }
        Ok(())
    }
}

impl Serializable for ModuleInfo {
    const TYPE_TAG: &'static str = "ModuleInfo";
}
