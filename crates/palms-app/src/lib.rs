//! PALMS terminal client
//!
//! Command-line front end for the PALMS inventory assistant backend.

pub mod app;
pub mod cli;
pub mod config;
pub mod display;
pub mod repl;

pub use app::App;
pub use cli::{Cli, Commands, FilesCommands};
pub use config::{setup_from_cli, AppConfig, FileConfig};

/// Initialise `env_logger`; `RUST_LOG` wins, otherwise `verbose` selects
/// debug output for the palms crates
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "warn,palms=debug,palms_api=debug,palms_chat=debug,palms_logging=debug"
    } else {
        "warn"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}
