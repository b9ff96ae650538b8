use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use log::info;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Config;
use crate::engine::EntitlementEngine;
use crate::events::{ChannelEvent, Reply};
use crate::keepalive;
use crate::provider::{FaceProvider, ImageProvider};
use crate::store::EntitlementStore;

/// Runs the interactive conversation shell: a local stand-in for the
/// messenger transport that feeds events into the engine and renders its
/// replies.
pub async fn handle_shell(user_id: String, data_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::new(data_dir)?;

    // Fatal without a token, same as a real transport binding would be.
    let _token = config.require_bot_token()?;

    if let Some(port) = config.keepalive_port {
        tokio::spawn(async move {
            if let Err(e) = keepalive::serve(port).await {
                log::error!("keep-alive endpoint stopped: {:#}", e);
            }
        });
    }

    let store = EntitlementStore::new(config.entitlements_file());
    let provider = FaceProvider::new(&config.provider_endpoint);
    let engine = EntitlementEngine::new(store, provider);

    let mut shell = ShellMode::new(config, engine, user_id)?;
    shell.run().await
}

pub struct ShellMode<P> {
    config: Config,
    engine: EntitlementEngine<P>,
    user_id: String,
    editor: DefaultEditor,
}

impl<P: ImageProvider> ShellMode<P> {
    pub fn new(config: Config, engine: EntitlementEngine<P>, user_id: String) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;

        let history_file = config.data_dir.join("shell_history.txt");
        if history_file.exists() {
            let _ = editor.load_history(&history_file);
        }

        Ok(ShellMode {
            config,
            engine,
            user_id,
            editor,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("{}", "facebot conversation shell".cyan().bold());
        println!("Chatting as user '{}'", self.user_id.green());
        println!("Commands: /start /generate /stats /help /exit");
        println!("Button payloads: agree disagree watch_ad buy_sub buy_credits");
        println!("Anything else is sent as a plain message.\n");

        loop {
            let line = match self.editor.readline("you> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(trimmed);

            match trimmed {
                "/exit" | "/quit" => break,
                "/help" => {
                    println!("Commands: /start /generate /stats /help /exit");
                    println!("Button payloads: agree disagree watch_ad buy_sub buy_credits");
                    continue;
                }
                _ => {}
            }

            let event = parse_line(trimmed);
            let today = Utc::now().date_naive();
            let replies = self.engine.handle_event(&self.user_id, event, today).await;

            for reply in replies {
                self.render(reply)?;
            }
        }

        let history_file = self.config.data_dir.join("shell_history.txt");
        let _ = self.editor.save_history(&history_file);
        info!("shell session ended for user {}", self.user_id);

        Ok(())
    }

    fn render(&self, reply: Reply) -> Result<()> {
        match reply {
            Reply::Text { text, actions } => {
                println!("{} {}", "bot>".cyan(), text);
                if !actions.is_empty() {
                    let buttons: Vec<String> = actions
                        .iter()
                        .map(|a| format!("[{}: {}]", a.payload().yellow(), a.label()))
                        .collect();
                    println!("     {}", buttons.join(" "));
                }
            }
            Reply::Photo { image, caption } => {
                let path = self.config.photo_file();
                std::fs::write(&path, &image)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!(
                    "{} 📷 {} ({} bytes, saved to {})",
                    "bot>".cyan(),
                    caption,
                    image.len(),
                    path.display()
                );
            }
        }
        Ok(())
    }
}

/// Shell input mirrors the channel contract: slash commands, bare button
/// payloads, and free text (username input while onboarding).
fn parse_line(line: &str) -> ChannelEvent {
    if let Some(command) = line.strip_prefix('/') {
        return ChannelEvent::from_command(command);
    }
    if let Some(event) = ChannelEvent::from_payload(line) {
        return event;
    }
    ChannelEvent::UsernameInput(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_routes_commands_payloads_and_text() {
        assert_eq!(parse_line("/start"), ChannelEvent::Start);
        assert_eq!(parse_line("/generate"), ChannelEvent::Generate);
        assert_eq!(parse_line("watch_ad"), ChannelEvent::WatchAd);
        assert_eq!(parse_line("agree"), ChannelEvent::Consent { agreed: true });
        assert_eq!(
            parse_line("alice"),
            ChannelEvent::UsernameInput("alice".to_string())
        );
        assert_eq!(
            parse_line("/unknowncmd"),
            ChannelEvent::Unknown("unknowncmd".to_string())
        );
    }
}
