use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

pub mod app;
pub mod commands;
pub mod plugins;
pub mod services;

use app::App;
use commands::chat_commands::{self, Flow};
use services::config::{self, StoreBackend};
use services::conversation::{Scope, TurnPolicy};
use services::presentation::TerminalView;

#[derive(Debug, Parser)]
#[command(name = "knowitall", about = "Chat with an assistant that remembers the conversation")]
pub struct Args {
    /// Model for the completion API (overrides AI_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// What a submit does while a reply is pending: queue, reject or concurrent
    #[arg(long, value_parser = config::turn_policy_from_str)]
    pub policy: Option<TurnPolicy>,

    /// Keep conversations in memory only
    #[arg(long)]
    pub memory: bool,

    /// Use the shared conversation root instead of per-user paths
    #[arg(long)]
    pub shared: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_args(config: &mut config::AppConfig, args: Args) {
    if let Some(model) = args.model {
        config.ai.model = model;
    }
    if let Some(policy) = args.policy {
        config.turn_policy = policy;
    }
    if args.memory {
        config.store = StoreBackend::Memory;
    }
    if args.shared {
        config.scope = Scope::Shared;
    }
}

async fn repl(app: Arc<App>) -> Result<(), String> {
    app.controller.presenter().redraw(&[]);
    let signed_out = app.auth().is_ok_and(|auth| !auth.session().is_signed_in());
    if signed_out && !app.controller.store().is_available() {
        println!("Sign in with /signin <email> <password> (or /signup) to start chatting.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(format!("Failed to read input: {e}")),
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match chat_commands::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("! {message}");
                continue;
            }
        };
        if chat_commands::execute(&app, command).await == Flow::Quit {
            break Ok(());
        }
    };
    // Pending turns still store and show their replies.
    app.finish().await;
    result
}

pub fn run() -> Result<(), String> {
    let args = Args::parse();
    init_logging();

    let mut config = config::load_app_config();
    apply_args(&mut config, args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;

    runtime.block_on(async move {
        let app = App::build(config, Arc::new(TerminalView::new())).await?;
        repl(Arc::new(app)).await
    })
}
