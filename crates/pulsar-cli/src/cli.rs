use clap::Parser;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The Pulsar Developers",
    version,
    about = "Pulsar launcher - loads the modules of a run plan and executes their self-tests.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// Path to the run plan in TOML format.
    #[arg(required = true, value_name = "PLAN")]
    pub plan: PathBuf,

    /// Directories searched, in order, for supermodule manifests.
    #[arg(value_name = "SEARCH_PATHS")]
    pub search_paths: Vec<PathBuf>,

    /// Runtime configuration file (search paths, cache sync, rank).
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory to write a checkpoint of every module cache to after the run.
    #[arg(short, long, value_name = "PATH")]
    pub outbase: Option<PathBuf>,

    /// Enable the debug output channel of every module.
    #[arg(long)]
    pub debug: bool,

    /// Colorize console output.
    #[arg(long)]
    pub color: bool,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn positional_search_paths_follow_the_plan() {
        let cli = Cli::parse_from(["pulsar-run", "plan.toml", "/a", "/b", "-vv", "--debug"]);
        assert_eq!(cli.plan, PathBuf::from("plan.toml"));
        assert_eq!(cli.search_paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.debug);
        assert!(!cli.color);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["pulsar-run", "plan.toml", "-q", "-v"]).is_err());
    }
}
