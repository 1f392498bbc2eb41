use std::sync::Arc;

use crate::app::App;
use crate::services::config::AiPublicConfig;
use crate::services::conversation::{ClearMode, TurnError, TurnOutcome};

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Say(String),
    Clear(ClearMode),
    Suggest(usize),
    ToggleSuggestions,
    Model(Option<String>),
    SignUp { email: String, password: String },
    SignIn { email: String, password: String },
    SignOut,
    Name(String),
    Conversations,
    Resume(String),
    Help,
    Quit,
}

/// Whether the read loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub const HELP: &str = "\
Type a message and press enter to send it.
  /clear                      start a new conversation
  /forget                     start a new conversation and delete the old one
  /suggest [n]                send suggestion n (default 0)
  /suggestions                show or hide suggestions
  /model [name]               show or change the model
  /signup <email> <password>  create an account
  /signin <email> <password>  sign in
  /signout                    sign out
  /name <display name>        set your display name
  /conversations              list stored conversations
  /resume <id>                continue a stored conversation
  /help                       this text
  /quit                       exit";

fn credentials(rest: &str, usage: &str) -> Result<(String, String), String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(password), None) => Ok((email.to_string(), password.to_string())),
        _ => Err(format!("Usage: {usage} <email> <password>")),
    }
}

pub fn parse(line: &str) -> Result<ChatCommand, String> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ChatCommand::Say(line.to_string()));
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));

    match name.to_ascii_lowercase().as_str() {
        "clear" => Ok(ChatCommand::Clear(ClearMode::Forget)),
        "forget" => Ok(ChatCommand::Clear(ClearMode::Delete)),
        "suggest" => {
            if rest.is_empty() {
                return Ok(ChatCommand::Suggest(0));
            }
            rest.parse::<usize>()
                .map(ChatCommand::Suggest)
                .map_err(|_| format!("Not a suggestion number: {rest}"))
        }
        "suggestions" => Ok(ChatCommand::ToggleSuggestions),
        "model" => Ok(ChatCommand::Model(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "signup" => {
            let (email, password) = credentials(rest, "/signup")?;
            Ok(ChatCommand::SignUp { email, password })
        }
        "signin" => {
            let (email, password) = credentials(rest, "/signin")?;
            Ok(ChatCommand::SignIn { email, password })
        }
        "signout" => Ok(ChatCommand::SignOut),
        "name" if !rest.is_empty() => Ok(ChatCommand::Name(rest.to_string())),
        "name" => Err("Usage: /name <display name>".to_string()),
        "conversations" => Ok(ChatCommand::Conversations),
        "resume" if !rest.is_empty() => Ok(ChatCommand::Resume(rest.to_string())),
        "resume" => Err("Usage: /resume <id>".to_string()),
        "help" | "?" => Ok(ChatCommand::Help),
        "quit" | "exit" => Ok(ChatCommand::Quit),
        other => Err(format!("Unknown command /{other}, try /help")),
    }
}

fn alert(message: impl std::fmt::Display) {
    println!("! {message}");
}

fn report_turn(result: Result<crate::services::conversation::TurnReport, TurnError>) {
    match result {
        Ok(report) => {
            if let TurnOutcome::Abandoned { .. } = report.outcome {
                log::debug!("Turn in {} ended without a reply", report.conversation_id);
            }
        }
        Err(TurnError::EmptyInput) => {}
        Err(err) => alert(err),
    }
}

/// Run one command. Turns run in the background so input stays responsive
/// while a reply is pending; `App::finish` waits for them. Errors the user
/// should see are printed as alerts.
pub async fn execute(app: &Arc<App>, command: ChatCommand) -> Flow {
    match command {
        ChatCommand::Say(text) => {
            let controller = app.controller.clone();
            app.spawn_turn(async move { report_turn(controller.submit(&text).await) });
        }
        ChatCommand::Suggest(index) => {
            let controller = app.controller.clone();
            app.spawn_turn(async move { report_turn(controller.suggest(index).await) });
        }
        ChatCommand::Clear(mode) => app.controller.clear(mode).await,
        ChatCommand::ToggleSuggestions => {
            app.controller.presenter().toggle_suggestions();
        }
        ChatCommand::Model(None) => println!("Model: {}", app.controller.model()),
        ChatCommand::Model(Some(model)) => {
            app.controller.set_model(&model);
            println!("Model: {}", app.controller.model());
        }
        ChatCommand::SignUp { email, password } => match app.auth() {
            Ok(auth) => match auth.sign_up(&email, &password).await {
                Ok(session) => {
                    app.controller.clear(ClearMode::Forget).await;
                    println!("Welcome, {}", session.email.as_deref().unwrap_or(&email));
                }
                Err(err) => alert(err),
            },
            Err(err) => alert(err),
        },
        ChatCommand::SignIn { email, password } => match app.auth() {
            Ok(auth) => match auth.sign_in(&email, &password).await {
                Ok(session) => {
                    app.controller.clear(ClearMode::Forget).await;
                    let name = session.display_name.as_deref().unwrap_or(&email);
                    println!("Signed in as {name}");
                }
                Err(err) => alert(err),
            },
            Err(err) => alert(err),
        },
        ChatCommand::SignOut => match app.auth() {
            Ok(auth) => {
                auth.sign_out();
                app.controller.clear(ClearMode::Forget).await;
                println!("Signed out");
            }
            Err(err) => alert(err),
        },
        ChatCommand::Name(name) => match app.auth() {
            Ok(auth) => match auth.update_profile(&name).await {
                Ok(session) => println!(
                    "Display name set to {}",
                    session.display_name.as_deref().unwrap_or(&name)
                ),
                Err(err) => alert(err),
            },
            Err(err) => alert(err),
        },
        ChatCommand::Conversations => match app.controller.store().list_conversations().await {
            Ok(ids) if ids.is_empty() => println!("No stored conversations"),
            Ok(ids) => {
                let current = app.controller.conversation_id();
                for id in ids {
                    let marker = if current.as_deref() == Some(id.as_str()) { "*" } else { " " };
                    println!("{marker} {id}");
                }
            }
            Err(err) => alert(err.message()),
        },
        ChatCommand::Resume(id) => {
            if let Err(err) = app.controller.resume(&id).await {
                alert(err.message());
            }
        }
        ChatCommand::Help => {
            println!("{HELP}");
            let public = AiPublicConfig::from(&app.config.ai);
            println!(
                "\nmodel {} via {} (key {}), store {} ({:?}), policy {:?}",
                app.controller.model(),
                public.base_url,
                if public.has_api_key { "set" } else { "missing" },
                app.controller.store().backend(),
                app.controller.store().scope(),
                app.controller.policy(),
            );
        }
        ChatCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_said() {
        assert_eq!(parse("  hi there "), Ok(ChatCommand::Say("hi there".into())));
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse("/clear"), Ok(ChatCommand::Clear(ClearMode::Forget)));
        assert_eq!(parse("/forget"), Ok(ChatCommand::Clear(ClearMode::Delete)));
        assert_eq!(parse("/suggest"), Ok(ChatCommand::Suggest(0)));
        assert_eq!(parse("/SUGGEST 2"), Ok(ChatCommand::Suggest(2)));
        assert!(parse("/suggest two").is_err());
        assert_eq!(parse("/model"), Ok(ChatCommand::Model(None)));
        assert_eq!(
            parse("/model  gpt-4o "),
            Ok(ChatCommand::Model(Some("gpt-4o".into())))
        );
        assert_eq!(parse("/name Ada Lovelace"), Ok(ChatCommand::Name("Ada Lovelace".into())));
        assert_eq!(parse("/resume conv_1"), Ok(ChatCommand::Resume("conv_1".into())));
        assert_eq!(parse("/quit"), Ok(ChatCommand::Quit));
    }

    #[test]
    fn test_credentials() {
        assert_eq!(
            parse("/signin a@b.c hunter2"),
            Ok(ChatCommand::SignIn {
                email: "a@b.c".into(),
                password: "hunter2".into()
            })
        );
        assert!(parse("/signup a@b.c").is_err());
        assert!(parse("/signup a@b.c pw extra").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse("/dance"),
            Err("Unknown command /dance, try /help".to_string())
        );
        assert!(parse("/resume").is_err());
    }
}
