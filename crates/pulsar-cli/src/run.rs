use crate::cli::Cli;
use crate::error::Result;
use crate::plan::{LoadStep, Plan};
use pulsar::core::options::{OptionError, OptionValue};
use pulsar::engine::checkpoint::Checkpoint;
use pulsar::engine::config::RuntimeConfig;
use pulsar::{CoreException, CoreResult, ErrorKind, ModuleAdministrator};
use tracing::{debug, error, info, warn};

/// Outcome counts of the test steps of a plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub passed: usize,
    pub expected_failures: usize,
    /// Keys whose test passed when failure was expected, or failed when it was not.
    pub unexpected: Vec<String>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        i32::try_from(self.unexpected.len()).unwrap_or(i32::MAX)
    }
}

pub fn runtime_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_toml_file(path)?,
        None => RuntimeConfig::default(),
    };
    config.search_paths.extend(cli.search_paths.iter().cloned());
    config.debug_all |= cli.debug;
    if let Some(outbase) = &cli.outbase {
        config.checkpoint_dir = Some(outbase.clone());
    }
    Ok(config)
}

/// Runs `plan` against a fresh administrator built from `config`.
///
/// Writes a checkpoint after the tests when `config` names a checkpoint directory.
pub fn run(config: &RuntimeConfig, plan: &Plan) -> Result<RunReport> {
    if let Some(dir) = &config.checkpoint_dir {
        std::fs::create_dir_all(dir)?;
    }
    let mut admin = ModuleAdministrator::with_config(config)?;
    if let Some(dir) = &config.checkpoint_dir {
        admin.set_checkpoint(Checkpoint::in_directory(dir, config.rank));
    }

    load_all(&admin, plan)?;
    debug!("Loaded modules:\n{}", admin.print_info());
    let report = test_all(&admin, plan);

    if admin.checkpoint().is_some() {
        let (local, global) = admin.save_checkpoint()?;
        info!(local, global, "Checkpoint written.");
    }
    Ok(report)
}

pub fn load_all(admin: &ModuleAdministrator, plan: &Plan) -> CoreResult<()> {
    for step in &plan.load {
        admin.load_module(&step.supermodule, &step.module, &step.key)?;
        apply_options(admin, step)?;
        info!(
            key = %step.key,
            "Loaded '{}' from supermodule '{}'.",
            step.module, step.supermodule
        );
    }
    Ok(())
}

/// Converts each plan value to the declared type of its option and applies it.
fn apply_options(admin: &ModuleAdministrator, step: &LoadStep) -> CoreResult<()> {
    if step.options.is_empty() {
        return Ok(());
    }
    let info = admin.module_key_info(&step.key)?;
    for (name, raw) in &step.options {
        let ty = info
            .options
            .entry(name)
            .map(|entry| entry.option_type())
            .ok_or_else(|| CoreException::from(OptionError::Unknown(name.clone())).with("key", &step.key))?;
        let value = OptionValue::from_toml(raw, ty).ok_or_else(|| {
            CoreException::new(ErrorKind::TypeMismatch, "Plan value does not fit the option type")
                .with("key", &step.key)
                .with("option", name)
                .with("expected", ty)
                .with("value", raw)
        })?;
        admin.change_option(&step.key, name, value)?;
    }
    Ok(())
}

pub fn test_all(admin: &ModuleAdministrator, plan: &Plan) -> RunReport {
    let mut report = RunReport::default();
    for step in &plan.test {
        match (admin.run_test(&step.key), step.expect_failure) {
            (Ok(()), false) => report.passed += 1,
            (Err(e), true) => {
                info!(key = %step.key, "Test failed as expected: {}", e);
                report.expected_failures += 1;
            }
            (Ok(()), true) => {
                warn!(key = %step.key, "Test passed but was expected to fail.");
                report.unexpected.push(step.key.clone());
            }
            (Err(e), false) => {
                error!(key = %step.key, "Test failed: {}", e);
                report.unexpected.push(step.key.clone());
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TestStep;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn load(module: &str, key: &str, options: &[(&str, toml::Value)]) -> LoadStep {
        LoadStep {
            supermodule: "pulsar_builtin".to_string(),
            module: module.to_string(),
            key: key.to_string(),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn test(key: &str, expect_failure: bool) -> TestStep {
        TestStep {
            key: key.to_string(),
            expect_failure,
        }
    }

    fn runner_plan() -> Plan {
        Plan {
            load: vec![
                load("CacheRoundTripTest", "CACHE", &[]),
                load("ChildTestRunner", "RUN", &[("OTHER_MODULE", toml::Value::String("CACHE".into()))]),
                load("ChildTestRunner", "UNSET", &[]),
            ],
            test: vec![test("RUN", false), test("UNSET", true), test("CACHE", false)],
        }
    }

    #[test]
    fn expected_outcomes_give_a_zero_exit_code() {
        let report = run(&RuntimeConfig::default(), &runner_plan()).unwrap();
        assert_eq!(report.passed, 2);
        assert_eq!(report.expected_failures, 1);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn unexpected_outcomes_are_counted() {
        let mut plan = runner_plan();
        plan.test = vec![test("RUN", true), test("UNSET", false), test("CACHE", false)];
        let report = run(&RuntimeConfig::default(), &plan).unwrap();
        assert_eq!(report.unexpected, vec!["RUN".to_string(), "UNSET".to_string()]);
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn plan_values_are_checked_against_the_option_type() {
        let admin = ModuleAdministrator::new();
        let plan = Plan {
            load: vec![load("ChildTestRunner", "RUN", &[("OTHER_MODULE", toml::Value::Integer(3))])],
            test: Vec::new(),
        };
        let err = load_all(&admin, &plan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.info_value("option"), Some("OTHER_MODULE"));

        let admin = ModuleAdministrator::new();
        let plan = Plan {
            load: vec![load("ChildTestRunner", "RUN", &[("NO_SUCH", toml::Value::String("x".into()))])],
            test: Vec::new(),
        };
        let err = load_all(&admin, &plan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOption);
    }

    #[test]
    fn missing_supermodule_is_a_framework_error() {
        let plan = Plan {
            load: vec![LoadStep {
                supermodule: "nowhere".to_string(),
                ..load("Anything", "K", &[])
            }],
            test: Vec::new(),
        };
        assert!(run(&RuntimeConfig::default(), &plan).is_err());
    }

    #[test]
    fn outbase_receives_a_checkpoint() {
        let dir = tempdir().unwrap();
        let outbase = dir.path().join("chk");
        let config = RuntimeConfig {
            checkpoint_dir: Some(outbase.clone()),
            ..RuntimeConfig::default()
        };
        run(&config, &runner_plan()).unwrap();
        assert!(outbase.join("pulsar_local.0.chk").is_file());
        assert!(outbase.join("pulsar_global.chk").is_file());
    }
}
