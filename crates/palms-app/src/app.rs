use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use palms_api::{safe_filename, BackendClient, ChatClient, DeleteSelection};
use palms_chat::{Conversation, LocalStore, SessionState};
use palms_logging::ConversationLogger;
use palms_types::FileInfo;

use crate::cli::{Commands, FilesCommands};
use crate::config::AppConfig;
use crate::display::{print_files, print_history, print_remote_history, TerminalSink};
use crate::repl::run_repl_mode;

/// Everything a command needs: the resolved config, the backend clients and
/// the conversation over the stored session
pub struct App {
    pub config: AppConfig,
    pub backend: BackendClient,
    pub conversation: Conversation,
}

impl App {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = LocalStore::open(config.store_dir())
            .with_context(|| format!("Failed to open the session store in {}", config.store_dir().display()))?;
        let session = SessionState::open_with_default_model(store, &config.default_model)
            .context("Failed to load the session")?;

        let client = ChatClient::new(&config.api_url)
            .verbose(config.verbose)
            .log_requests(config.log_requests);
        let backend = BackendClient::new(&config.api_url).verbose(config.verbose);

        let mut conversation = Conversation::new(client, session).with_model_override(config.model_override.clone());
        if config.log_conversations {
            match ConversationLogger::new(&config.data_dir).await {
                Ok(logger) => {
                    log::debug!("conversation log at {}", logger.path().display());
                    conversation = conversation.with_logger(logger);
                }
                Err(e) => eprintln!("{} Conversation logging disabled: {:#}", "⚠️".yellow(), e),
            }
        }

        Ok(Self {
            config,
            backend,
            conversation,
        })
    }

    fn session_id(&self) -> String {
        self.conversation.session().session_id().to_string()
    }

    /// Run one subcommand
    pub async fn run(mut self, command: Commands) -> Result<ExitCode> {
        let result = match command {
            Commands::Chat => run_repl_mode(&mut self).await.map(|_| ExitCode::SUCCESS),
            Commands::Ask { message } => self.ask(&message.join(" ")).await,
            Commands::Models => self.models().await.map(|_| ExitCode::SUCCESS),
            Commands::Model { name } => self.select_model(&name).map(|_| ExitCode::SUCCESS),
            Commands::Files { command } => self.files(command).await.map(|_| ExitCode::SUCCESS),
            Commands::History { remote, clear } => self.history(remote, clear).await.map(|_| ExitCode::SUCCESS),
            Commands::Session { reset } => self.session(reset).await.map(|_| ExitCode::SUCCESS),
            Commands::Health => self.health().await.map(|_| ExitCode::SUCCESS),
        };

        self.conversation.shutdown().await;
        result
    }

    /// One-shot send; a failed reply gives a non-zero exit code
    pub async fn ask(&mut self, message: &str) -> Result<ExitCode> {
        let mut sink = TerminalSink::new();
        match self.conversation.send(message, &mut sink).await? {
            None => bail!("Nothing to send: the message is empty"),
            Some(outcome) if outcome.error_message().is_some() => Ok(ExitCode::FAILURE),
            Some(_) => Ok(ExitCode::SUCCESS),
        }
    }

    pub async fn models(&self) -> Result<()> {
        let list = self.backend.list_models().await;
        if list.fallback {
            let reason = list.error.as_deref().unwrap_or("no models reported");
            println!("{}", format!("Backend model list unavailable ({}); showing defaults", reason).yellow());
        } else if let Some(error) = &list.error {
            println!("{}", format!("Backend reported: {}", error).yellow());
        }

        let current = self.conversation.model();
        for model in &list.models {
            if model == current {
                println!("{} {}", "*".bright_green().bold(), model.bright_green());
            } else {
                println!("  {}", model);
            }
        }
        if !list.models.iter().any(|m| m == current) {
            println!("{} {} {}", "*".bright_green().bold(), current.bright_green(), "(not offered by backend)".bright_black());
        }
        Ok(())
    }

    pub fn select_model(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Model name must not be empty");
        }
        self.conversation.select_model(name)?;
        println!("{} {}", "Model set to".green(), name.bright_green().bold());
        Ok(())
    }

    pub async fn files(&mut self, command: FilesCommands) -> Result<()> {
        let session_id = self.session_id();
        match command {
            FilesCommands::List => {
                let files = self.backend.list_files(&session_id).await?;
                print_files(&files);
                self.conversation.session_mut().set_files(files)?;
            }
            FilesCommands::Upload { paths } => {
                let uploaded = self.backend.upload_files(&session_id, &paths).await?;
                for (local, stored) in match_uploads(&paths, &uploaded) {
                    match stored {
                        Some(file) if file.name == local => println!("{} {}", "✓ Uploaded".green(), file.name),
                        Some(file) => {
                            println!("{} {} {} {}", "✓ Uploaded".green(), local, "as".bright_black(), file.name)
                        }
                        None => println!("{} {} {}", "⚠".yellow(), local, "was not stored by the backend".yellow()),
                    }
                }
                self.refresh_files(&session_id).await;
            }
            FilesCommands::Delete { all, names } => {
                let selection = if all {
                    DeleteSelection::All
                } else {
                    DeleteSelection::Files(names)
                };
                self.backend.delete_files(&session_id, &selection).await?;
                println!("{}", "✓ Deleted".green());
                self.refresh_files(&session_id).await;
            }
            FilesCommands::Download { name, out } => {
                let dest = out.unwrap_or_else(|| PathBuf::from(safe_filename(&name)));
                let bytes = self.backend.download_file(&session_id, &name, &dest).await?;
                println!("{} {} ({} bytes)", "✓ Saved".green(), dest.display(), bytes);
            }
        }
        Ok(())
    }

    async fn refresh_files(&mut self, session_id: &str) {
        match self.backend.list_files(session_id).await {
            Ok(files) => {
                if let Err(e) = self.conversation.session_mut().set_files(files) {
                    log::warn!("could not save the file list: {}", e);
                }
            }
            Err(e) => log::warn!("could not refresh the file list: {}", e),
        }
    }

    pub async fn history(&mut self, remote: bool, clear: bool) -> Result<()> {
        let session_id = self.session_id();
        if clear {
            self.conversation.session_mut().clear_history()?;
            if let Err(e) = self.backend.clear_history(&session_id).await {
                eprintln!("{} Backend history not cleared: {}", "⚠️".yellow(), e);
            }
            println!("{}", "History cleared.".green());
            return Ok(());
        }

        if remote {
            let entries = self.backend.history(&session_id).await?;
            print_remote_history(&entries);
        } else {
            print_history(self.conversation.session().history());
        }
        Ok(())
    }

    pub async fn session(&mut self, reset: bool) -> Result<()> {
        if reset {
            self.conversation.session_mut().reset()?;
            println!("{}", "Started a new session.".green());
        }
        let session = self.conversation.session();
        println!("Session:  {}", session.session_id().as_str().bright_cyan());
        println!("Model:    {}", self.conversation.model());
        println!("Messages: {}", session.history().len());
        println!("Files:    {}", session.files().len());
        println!("Backend:  {}", self.config.api_url);
        Ok(())
    }

    pub async fn health(&self) -> Result<()> {
        let health = self
            .backend
            .health()
            .await
            .with_context(|| format!("Backend at {} is not reachable", self.config.api_url))?;
        println!("{} {} {}", "✓".green(), health.status.bright_green(), health.message);
        Ok(())
    }
}

/// Pair each local path with the entry the backend stored for it. The backend
/// stores the sanitised file name and may return fewer entries than were sent.
pub fn match_uploads<'a>(paths: &[PathBuf], uploaded: &'a [FileInfo]) -> Vec<(String, Option<&'a FileInfo>)> {
    paths
        .iter()
        .map(|path| {
            let local = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let stored_name = safe_filename(&local);
            let stored = uploaded
                .iter()
                .find(|f| f.name == local)
                .or_else(|| uploaded.iter().find(|f| f.name == stored_name));
            (local, stored)
        })
        .collect()
}
