use std::fmt;
use std::path::{self, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use script_consolidate_core::{ConfigStore, ConsolidateOptions, DEFAULT_CONFIG_PATH, Error};

#[derive(Parser, Debug, Clone)]
#[command(name = "script-consolidate", version)]
#[command(about = "Find scripts that define the same functions and consolidate them")]
pub(crate) struct Cli {
    /// Workspace root; relative artifact paths resolve against it
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub(crate) root: PathBuf,

    /// Configuration file (default: <root>/System/Configuration/script_consolidation_config.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Output JSON
    #[arg(long, global = true)]
    pub(crate) json: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Discover scripts under DIR when the registry is missing (repeatable)
    #[arg(long = "discover", global = true, value_name = "DIR")]
    pub(crate) discover: Vec<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Extract functions, index them and score candidate groups
    Analyze,
    /// Analyze, then write the consolidation plan
    Plan,
    /// Execute entries of the saved plan
    Execute(ExecuteArgs),
    /// Render the Markdown report from the plan and results
    Report,
    /// Analyze, plan, execute and report in one run
    All(ExecuteArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Execute(_) => "execute",
            Self::Report => "report",
            Self::All(_) => "all",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExecuteArgs {
    /// Only execute these plan entries (comma separated group ids)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub(crate) group_ids: Option<Vec<usize>>,

    /// Describe what would change without touching any file
    #[arg(long)]
    pub(crate) dry_run: bool,
}

impl Cli {
    pub(crate) fn selected_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Analyze)
    }

    pub(crate) fn resolved_root(&self) -> Result<PathBuf, Error> {
        path::absolute(&self.root).map_err(|e| Error::read(&self.root, e))
    }

    pub(crate) fn config_path(&self, root: &path::Path) -> PathBuf {
        match &self.config {
            Some(path) => path.clone(),
            None => root.join(DEFAULT_CONFIG_PATH),
        }
    }

    /// Builds the run options: configuration file first, command-line
    /// discovery roots appended.
    pub(crate) fn options(&self) -> Result<ConsolidateOptions, Error> {
        let root = self.resolved_root()?;
        let store = ConfigStore::load(self.config_path(&root))?;
        let mut options = store.to_options(&root)?;
        options.discover_roots.extend(self.discover.iter().cloned());
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("script-consolidate").chain(args.iter().copied()))
    }

    #[test]
    fn no_subcommand_means_analyze() -> Result<(), clap::Error> {
        let cli = parse(&["--json"])?;
        assert!(cli.json);
        assert_eq!(cli.selected_command(), Command::Analyze);
        Ok(())
    }

    #[test]
    fn group_ids_split_on_commas() -> Result<(), clap::Error> {
        let cli = parse(&["execute", "--group-ids", "0,2,5", "--dry-run"])?;
        assert_eq!(
            cli.selected_command(),
            Command::Execute(ExecuteArgs {
                group_ids: Some(vec![0, 2, 5]),
                dry_run: true,
            })
        );
        Ok(())
    }

    #[test]
    fn global_flags_follow_the_subcommand() -> Result<(), clap::Error> {
        let cli = parse(&["all", "--root", "/tmp/ws", "-vv", "--discover", "Scripts"])?;
        assert_eq!(cli.root, PathBuf::from("/tmp/ws"));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.discover, vec![PathBuf::from("Scripts")]);
        assert_eq!(cli.selected_command(), Command::All(ExecuteArgs::default()));
        Ok(())
    }

    #[test]
    fn bad_group_id_is_a_usage_error() {
        let err = parse(&["execute", "--group-ids", "1,x"]).err();
        assert!(err.is_some_and(|e| e.exit_code() == 2));
    }

    #[test]
    fn config_defaults_under_root() -> Result<(), clap::Error> {
        let cli = parse(&[])?;
        let path = cli.config_path(path::Path::new("/ws"));
        assert_eq!(
            path,
            PathBuf::from("/ws/System/Configuration/script_consolidation_config.json")
        );
        Ok(())
    }
}
