//! The TOML run plan executed by the launcher.
//!
//! ```toml
//! [[load]]
//! supermodule = "pulsar_builtin"
//! module = "ChildTestRunner"
//! key = "RUN"
//! [load.options]
//! OTHER_MODULE = "CACHE"
//!
//! [[test]]
//! key = "RUN"
//! expect-failure = false
//! ```

use crate::error::{CliError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    #[serde(default)]
    pub load: Vec<LoadStep>,
    #[serde(default)]
    pub test: Vec<TestStep>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoadStep {
    pub supermodule: String,
    pub module: String,
    pub key: String,
    /// Values applied with `change_option` right after loading.
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TestStep {
    pub key: String,
    #[serde(default)]
    pub expect_failure: bool,
}

impl Plan {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let plan: Plan = toml::from_str(&content).map_err(|source| CliError::PlanParsing {
            path: path.to_path_buf(),
            source,
        })?;
        plan.check()?;
        debug!(
            "Run plan '{}' has {} load and {} test steps.",
            path.display(),
            plan.load.len(),
            plan.test.len()
        );
        Ok(plan)
    }

    /// Rejects plans that load one key twice or test a key no step loads.
    fn check(&self) -> Result<()> {
        let mut keys = BTreeSet::new();
        for step in &self.load {
            if step.key.is_empty() {
                return Err(CliError::Plan(format!(
                    "module '{}' is loaded with an empty key",
                    step.module
                )));
            }
            if !keys.insert(step.key.as_str()) {
                return Err(CliError::Plan(format!("key '{}' is loaded twice", step.key)));
            }
        }
        if let Some(step) = self.test.iter().find(|t| !keys.contains(t.key.as_str())) {
            return Err(CliError::Plan(format!(
                "test of key '{}' which no load step defines",
                step.key
            )));
        }
        Ok(())
    }
}
