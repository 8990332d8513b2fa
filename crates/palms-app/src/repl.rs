use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::app::App;
use crate::cli::FilesCommands;
use crate::display::TerminalSink;

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Message(String),
    Model(String),
    Models,
    History,
    Clear,
    Files,
    New,
    Help,
    Exit,
    Unknown(String),
    Empty,
}

pub fn parse_input(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    if line == "exit" || line == "quit" {
        return ReplInput::Exit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplInput::Message(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "model" if arg.is_empty() => ReplInput::Models,
        "model" => ReplInput::Model(arg.to_string()),
        "models" => ReplInput::Models,
        "history" => ReplInput::History,
        "clear" => ReplInput::Clear,
        "files" => ReplInput::Files,
        "new" => ReplInput::New,
        "help" => ReplInput::Help,
        "exit" | "quit" => ReplInput::Exit,
        other => ReplInput::Unknown(other.to_string()),
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  /model <name>   select the model for future messages");
    println!("  /models         list available models");
    println!("  /history        show this session's messages");
    println!("  /clear          clear the history");
    println!("  /files          list uploaded files");
    println!("  /new            start a new session");
    println!("  exit, quit      leave");
    println!("{}", "Press Ctrl-C while a reply streams to stop it.".bright_black());
}

/// Run interactive REPL mode
pub async fn run_repl_mode(app: &mut App) -> Result<()> {
    println!("{}", "📦 PALMS Inventory Assistant".bright_cyan().bold());
    println!("{}", format!("Backend: {}", app.config.api_url).bright_black());
    println!(
        "{}",
        format!("Session: {}", app.conversation.session().session_id()).bright_black()
    );
    println!("{}", "Type 'exit' or 'quit' to exit, or '/help' for commands\n".bright_black());

    // One Ctrl-C handler for the whole session; it only has an effect while a
    // reply is streaming, since the line editor handles Ctrl-C at the prompt
    let cancel_handle = app.conversation.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if cancel_handle.cancel() {
                println!("\n{}", "^C - Interrupting...".bright_yellow());
            }
        }
    });

    let mut rl = DefaultEditor::new()?;

    loop {
        let model_indicator = format!("[{}]", app.conversation.model()).bright_magenta();
        let readline = rl.readline(&format!("{} {} ", model_indicator, "You:".bright_green().bold()));

        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C (type 'exit' to quit)".bright_black());
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                break;
            }
        };

        let input = parse_input(&line);
        if !matches!(input, ReplInput::Empty) {
            let _ = rl.add_history_entry(line.as_str());
        }

        let result = match input {
            ReplInput::Empty => Ok(()),
            ReplInput::Exit => break,
            ReplInput::Help => {
                print_help();
                Ok(())
            }
            ReplInput::Message(message) => {
                let mut sink = TerminalSink::new();
                app.conversation.send(&message, &mut sink).await.map(|_| ())
            }
            ReplInput::Model(name) => app.select_model(&name),
            ReplInput::Models => app.models().await,
            ReplInput::History => app.history(false, false).await,
            ReplInput::Clear => app.history(false, true).await,
            ReplInput::Files => app.files(FilesCommands::List).await,
            ReplInput::New => app.session(true).await,
            ReplInput::Unknown(name) => {
                println!("{} /{} {}", "Unknown command".yellow(), name, "(try /help)".bright_black());
                Ok(())
            }
        };

        if let Err(e) = result {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
        }
    }

    ctrl_c.abort();
    println!("{}", "Goodbye!".bright_cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(
            parse_input("  how many SKU-77 are left?  "),
            ReplInput::Message("how many SKU-77 are left?".to_string())
        );
    }

    #[test]
    fn test_blank_line_is_empty() {
        assert_eq!(parse_input(" \t "), ReplInput::Empty);
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(parse_input("/model llama3.1"), ReplInput::Model("llama3.1".to_string()));
        assert_eq!(parse_input("/model"), ReplInput::Models);
        assert_eq!(parse_input("/models"), ReplInput::Models);
        assert_eq!(parse_input("/clear"), ReplInput::Clear);
        assert_eq!(parse_input("/new"), ReplInput::New);
        assert_eq!(parse_input("/files"), ReplInput::Files);
        assert_eq!(parse_input("/history"), ReplInput::History);
        assert_eq!(parse_input("/bogus x"), ReplInput::Unknown("bogus".to_string()));
    }

    #[test]
    fn test_exit_words() {
        assert_eq!(parse_input("exit"), ReplInput::Exit);
        assert_eq!(parse_input("quit"), ReplInput::Exit);
        assert_eq!(parse_input("/quit"), ReplInput::Exit);
        assert_eq!(parse_input("exit now"), ReplInput::Message("exit now".to_string()));
    }
}
