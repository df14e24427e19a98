use crate::client::{ChatEntry, ChatSession, ChatView, Notice, RelayClient, SendOutcome};
use crate::logging::{init_tracing, setup_panic_hook, LogTarget};
use crate::types::*;
use crate::{AppState, Credentials, ServeArgs};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use futures_util::StreamExt;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "base-agent", version, about = "Base AI agent chat relay and terminal client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP relay.
    Serve(ServeArgs),
    /// Chat with a running relay from the terminal.
    Chat(ChatArgs),
    /// Inspect or change stored UI preferences.
    Prefs(PrefsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long, default_value = "http://127.0.0.1:8080/agent-chat")]
    pub relay_url: String,
    /// Wallet address the conversation is recorded under.
    #[arg(long)]
    pub user_address: String,
    /// Bearer token sent to the relay.
    #[arg(long)]
    pub token: Option<String>,
    #[arg(long, default_value = "base-agent-prefs.json")]
    pub prefs_path: String,
    #[arg(long, default_value = "logs")]
    pub log_dir: String,
}

#[derive(Args, Debug, Clone)]
pub struct PrefsArgs {
    #[arg(long, default_value = "base-agent-prefs.json")]
    pub prefs_path: String,
    #[command(subcommand)]
    pub action: PrefsAction,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefsAction {
    Show,
    DismissChatPrompt,
    ResetChatPrompt,
    CompleteOnboarding,
    ResetOnboarding,
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Chat(args) => run_chat(args).await,
        Command::Prefs(args) => run_prefs(args),
    }
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let _guards = init_tracing(&args.log_dir, LogTarget::StdoutAndFiles);
    setup_panic_hook();

    let credentials = Credentials::from_env();
    credentials.warn_missing();

    let db = crate::db::init_db(&args.database).await?;

    let client = reqwest::Client::builder()
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .tcp_keepalive(Some(std::time::Duration::from_secs(60)))
        .build()?;

    let addr = format!("{}:{}", args.host, args.port);
    let state = Arc::new(AppState::new(client, credentials, db, args));
    let app = crate::server::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("base-agent relay listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;
    Ok(())
}

/// Prints the conversation to the terminal. Streaming updates only ever
/// extend the draft, so just the new suffix is written.
#[derive(Default)]
pub struct TerminalView {
    streaming_id: Option<String>,
    printed: usize,
}

impl TerminalView {
    fn end_line(&mut self) {
        if self.streaming_id.take().is_some() {
            println!();
        }
        self.printed = 0;
    }
}

impl ChatView for TerminalView {
    fn entry_added(&mut self, entry: &ChatEntry) {
        self.end_line();
        match entry.role {
            Role::User => {}
            Role::Assistant => {
                print!("{} {}", "assistant>".cyan().bold(), entry.content);
                self.streaming_id = Some(entry.id.clone());
                self.printed = entry.content.len();
            }
            Role::System => println!("{}", entry.content.dimmed()),
        }
        let _ = std::io::stdout().flush();
    }

    fn entry_updated(&mut self, id: &str, content: &str) {
        if self.streaming_id.as_deref() != Some(id) {
            return;
        }
        match content.get(self.printed..) {
            Some(suffix) if content.len() >= self.printed => print!("{}", suffix),
            _ => print!("\r{} {}", "assistant>".cyan().bold(), content),
        }
        self.printed = content.len();
        let _ = std::io::stdout().flush();
    }

    fn entry_removed(&mut self, id: &str) {
        if self.streaming_id.as_deref() == Some(id) {
            print!("\r");
            self.streaming_id = None;
            self.printed = 0;
        }
    }

    fn notice(&mut self, notice: Notice) {
        self.end_line();
        eprintln!("{}", notice.text().yellow().bold());
    }
}

pub async fn run_chat(args: ChatArgs) -> Result<()> {
    let _guards = init_tracing(&args.log_dir, LogTarget::FilesOnly);
    setup_panic_hook();

    let prefs = crate::prefs::init(&args.prefs_path)?;
    if prefs.chat_prompt_visible(true) {
        println!(
            "{}",
            "Chat with your Base AI agent. Type /dismiss to hide this hint, Ctrl-C cancels a reply, Ctrl-D exits."
                .dimmed()
        );
    }

    let relay = RelayClient::new(&args.relay_url, args.token.clone());
    let mut session = ChatSession::with_greeting(relay, UserAddress(args.user_address.clone()));
    let mut view = TerminalView::default();
    for entry in session.history() {
        view.entry_added(entry);
    }
    view.end_line();

    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    loop {
        print!("{} ", "you>".green().bold());
        let _ = std::io::stdout().flush();

        let line = match lines.next().await {
            Some(Ok(l)) => l,
            Some(Err(e)) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
            None => break,
        };

        if line.trim() == "/dismiss" {
            prefs.dismiss_chat_prompt()?;
            continue;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let outcome = session.send(&line, &mut view, &cancel).await;
        watcher.abort();
        view.end_line();

        if outcome == SendOutcome::Cancelled {
            eprintln!("{}", "(cancelled)".dimmed());
        }
    }
    Ok(())
}

pub fn run_prefs(args: PrefsArgs) -> Result<()> {
    let store = crate::prefs::init(&args.prefs_path)?;
    match args.action {
        PrefsAction::Show => {}
        PrefsAction::DismissChatPrompt => store.dismiss_chat_prompt()?,
        PrefsAction::ResetChatPrompt => store.reset_chat_prompt()?,
        PrefsAction::CompleteOnboarding => store.complete_onboarding()?,
        PrefsAction::ResetOnboarding => store.reset_onboarding()?,
    }
    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
    Ok(())
}
