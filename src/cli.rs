use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "archindex",
    about = "Ancestry-aware indexing of archival collections"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index batch files (JSON) or directories of them
    Ingest(IngestArgs),
    /// Delete one document from the index
    Remove {
        /// Entity id
        id: String,
    },
    /// Print a stored document
    Show {
        /// Entity id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List ids of every document below an entity
    Descendants {
        /// Entity id
        id: String,
    },
    /// Manage archived file content used for metadata extraction
    Object {
        #[command(subcommand)]
        action: ObjectAction,
    },
    /// Read or change indexer settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show system status and statistics
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Batch files or directories to scan for *.json
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Commit after every batch file instead of once at the end
    #[arg(long)]
    pub commit_each: bool,
}

// -- Object subcommands --

#[derive(Debug, Subcommand)]
pub enum ObjectAction {
    /// Store the content of a file entity
    Put {
        /// File entity id
        id: String,
        /// Path to the content on disk
        path: PathBuf,
    },
    /// Delete stored content
    Remove {
        /// File entity id
        id: String,
    },
    /// List ids with stored content
    List,
}

// -- Config subcommands --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective value of a setting
    Get {
        key: String,
    },
    /// Persist a setting
    Set {
        key: String,
        value: String,
    },
    /// Revert a setting to its default
    Unset {
        key: String,
    },
    /// Print every effective setting
    List,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "archindex",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_ingest() {
        let cli = Cli::parse_from(["archindex", "ingest", "a.json", "dir"]);
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(
                    args.paths,
                    vec![PathBuf::from("a.json"), PathBuf::from("dir")]
                );
                assert!(!args.commit_each);
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn ingest_requires_a_path() {
        assert!(Cli::try_parse_from(["archindex", "ingest"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "archindex",
            "show",
            "U1",
            "--json",
            "--data-dir",
            "/tmp/x",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(cli.command, Command::Show { json: true, .. }));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(
            Cli::try_parse_from(["archindex", "-q", "-v", "status"]).is_err()
        );
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
