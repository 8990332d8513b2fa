use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// CLI arguments for palms
#[derive(Parser, Debug)]
#[command(name = "palms")]
#[command(about = "PALMS inventory assistant - chat with your warehouse data from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend base URL
    #[arg(long, value_name = "URL", env = "PALMS_API_URL")]
    pub api_url: Option<String>,

    /// Model to use for this run (does not change the saved selection)
    #[arg(long, short = 'm', value_name = "MODEL", env = "PALMS_MODEL")]
    pub model: Option<String>,

    /// Directory for the session store, logs and config.toml (default: ~/.palms)
    #[arg(long, value_name = "DIR", env = "PALMS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose debug output (shows HTTP requests, responses, stream chunks)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Write every chat request to the logs directory
    #[arg(long)]
    pub log_requests: bool,

    /// Record conversations as JSONL under the logs directory
    #[arg(long)]
    pub log_conversations: bool,

    /// Generate shell completions
    #[arg(long, value_enum)]
    pub generate: Option<Shell>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Send a single message and print the reply
    Ask {
        /// Message to send
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// List the models the backend offers
    Models,
    /// Select the model used for future messages
    Model {
        /// Model name, e.g. phi3:mini
        name: String,
    },
    /// Manage files uploaded for this session
    Files {
        #[command(subcommand)]
        command: FilesCommands,
    },
    /// Show the conversation history
    History {
        /// Show the backend's record instead of the local one
        #[arg(long)]
        remote: bool,
        /// Clear the history (locally and on the backend)
        #[arg(long)]
        clear: bool,
    },
    /// Show the current session, or start a new one
    Session {
        /// Start a new session with empty history
        #[arg(long)]
        reset: bool,
    },
    /// Check that the backend is reachable
    Health,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum FilesCommands {
    /// List uploaded files
    List,
    /// Upload files (pdf, csv, xlsx, xls, txt; up to 20 MiB each)
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete uploaded files
    Delete {
        /// Delete every file of this session
        #[arg(long, conflicts_with = "names")]
        all: bool,
        /// Names of the files to delete
        names: Vec<String>,
    },
    /// Download an uploaded file
    Download {
        name: String,
        /// Destination path (default: the file name in the current directory)
        #[arg(long, short = 'o', value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

impl Cli {
    /// The subcommand to run; interactive chat when none was given
    pub fn subcommand(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_chat() {
        let cli = Cli::try_parse_from(["palms"]).unwrap();
        assert_eq!(cli.subcommand(), Commands::Chat);
    }

    #[test]
    fn test_ask_joins_words() {
        let cli = Cli::try_parse_from(["palms", "ask", "how", "many", "boxes?"]).unwrap();
        assert_eq!(
            cli.subcommand(),
            Commands::Ask {
                message: vec!["how".into(), "many".into(), "boxes?".into()]
            }
        );
    }

    #[test]
    fn test_files_delete_all_conflicts_with_names() {
        assert!(Cli::try_parse_from(["palms", "files", "delete", "--all", "a.pdf"]).is_err());
        let cli = Cli::try_parse_from(["palms", "files", "delete", "--all"]).unwrap();
        assert_eq!(
            cli.subcommand(),
            Commands::Files {
                command: FilesCommands::Delete { all: true, names: vec![] }
            }
        );
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "palms",
            "--api-url",
            "http://10.0.0.5:8000",
            "-m",
            "mistral",
            "-v",
            "history",
            "--remote",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://10.0.0.5:8000"));
        assert_eq!(cli.model.as_deref(), Some("mistral"));
        assert!(cli.verbose);
        assert_eq!(cli.subcommand(), Commands::History { remote: true, clear: false });
    }
}
