use anyhow::{Context, Result};
use clap::Parser;
use relaychat::config::{PathManager, load_env_file};
use relaychat::logging::{init_logging, init_stderr_logging};
use relaychat::{
    Backends, Conversation, Draft, HttpBackend, LocalFile, Message, MessageId, MessageStatus, Notice,
    NoticeLevel, Notifier, Role, SessionIdStore, Settings, StoreEvent,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Submission endpoint
    #[arg(long, env = "RELAYCHAT_SUBMIT_URL")]
    submit_url: Option<String>,

    /// File upload endpoint
    #[arg(long, env = "RELAYCHAT_UPLOAD_URL")]
    upload_url: Option<String>,

    /// Job status endpoint
    #[arg(long, env = "RELAYCHAT_STATUS_URL")]
    status_url: Option<String>,

    /// Initial mode sent with each submission
    #[arg(long)]
    mode: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long, short)]
    tracing: bool,

    /// Do not persist the session id between runs
    #[arg(long)]
    ephemeral: bool,
}

const HELP: &str = "Commands: /attach <path> /tool <name|none> /mode <name|none> /reset /help /quit";

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let args = Args::parse();

    let _log_guard = if args.tracing {
        init_stderr_logging();
        None
    } else {
        init_logging()
    };

    let mut settings = Settings::load_or_default(args.config.as_deref())?;
    if let Some(url) = args.submit_url {
        settings.endpoints.submit = url;
    }
    if let Some(url) = args.upload_url {
        settings.endpoints.upload = url;
    }
    if let Some(url) = args.status_url {
        settings.endpoints.status = url;
    }
    tracing::info!(?settings, "starting");

    let backend = Arc::new(
        HttpBackend::new(settings.endpoints.clone(), settings.request_timeout())
            .context("failed to create HTTP client")?,
    );
    let session = match PathManager::session_path() {
        Some(path) if !args.ephemeral => SessionIdStore::persisted(path),
        _ => SessionIdStore::in_memory(),
    };
    let (notifier, notices) = Notifier::channel();
    let conversation = Arc::new(Conversation::new(
        Backends::http(backend),
        &settings,
        session,
        notifier,
    ));
    conversation.set_mode(args.mode).await;

    tokio::spawn(render_events(conversation.subscribe().await));
    tokio::spawn(render_notices(notices));

    println!("relaychat → {}", settings.endpoints.submit);
    println!("{HELP}");
    repl(conversation).await
}

async fn repl(conversation: Arc<Conversation>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut attachments: Vec<LocalFile> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map(|(n, a)| (n, a.trim()))
                .unwrap_or((command, ""));
            match name {
                "quit" | "exit" => break,
                "help" => println!("{HELP}"),
                "reset" | "clear" => {
                    attachments.clear();
                    if let Err(e) = conversation.reset().await {
                        eprintln!("! reset incomplete: {e}");
                    }
                }
                "attach" if !arg.is_empty() => match LocalFile::read(arg).await {
                    Ok(file) => {
                        println!("attached {} ({}, {} bytes)", file.name, file.content_type, file.size());
                        attachments.push(file);
                    }
                    Err(e) => eprintln!("! cannot read {arg}: {e}"),
                },
                "tool" if !arg.is_empty() => {
                    conversation.select_tool(optional(arg)).await;
                    println!("tool: {}", arg);
                }
                "mode" if !arg.is_empty() => {
                    conversation.set_mode(optional(arg)).await;
                    println!("mode: {}", arg);
                }
                _ => println!("{HELP}"),
            }
            continue;
        }

        let draft = Draft {
            text: line.to_string(),
            files: std::mem::take(&mut attachments),
        };
        let conversation = Arc::clone(&conversation);
        // submissions run in the background so /reset stays available
        tokio::spawn(async move {
            if let Err(e) = conversation.submit(draft).await {
                tracing::debug!(error = %e, "submission ended with error");
            }
        });
    }
    Ok(())
}

fn optional(arg: &str) -> Option<String> {
    (!arg.eq_ignore_ascii_case("none")).then(|| arg.to_string())
}

struct Shown {
    content: String,
    streamed: bool,
}

async fn render_events(mut events: mpsc::UnboundedReceiver<StoreEvent>) {
    let mut shown: HashMap<MessageId, Shown> = HashMap::new();
    while let Some(event) = events.recv().await {
        match event {
            StoreEvent::Appended(msg) if msg.role == Role::User => {}
            StoreEvent::Appended(msg) | StoreEvent::Updated(msg) => render(&mut shown, &msg),
            StoreEvent::Cleared => {
                shown.clear();
                println!("-- conversation cleared --");
            }
        }
        let _ = std::io::stdout().flush();
    }
}

fn render(shown: &mut HashMap<MessageId, Shown>, msg: &Message) {
    let prev = shown.entry(msg.id).or_insert(Shown {
        content: String::new(),
        streamed: false,
    });

    match &msg.status {
        Some(MessageStatus::Pending { .. }) => println!("assistant [working]> {}", msg.content),
        None => {
            if !prev.streamed && !msg.content.is_empty() {
                print!("assistant> ");
                prev.streamed = true;
            }
            match msg.content.strip_prefix(prev.content.as_str()) {
                Some(rest) => print!("{rest}"),
                None => print!("\n{}", msg.content),
            }
        }
        Some(status) => {
            if prev.streamed && prev.content == msg.content {
                println!();
            } else {
                let tag = if *status == MessageStatus::Failed { " [failed]" } else { "" };
                println!("assistant{tag}> {}", msg.content);
            }
            for att in &msg.attachments {
                println!("  [{}] {} {}", att.content_type, att.name, att.url);
            }
        }
    }
    prev.content = msg.content.clone();
}

async fn render_notices(mut notices: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        let marker = match notice.level {
            NoticeLevel::Error => "!",
            NoticeLevel::Warning => "~",
            NoticeLevel::Info => "i",
        };
        eprintln!("{marker} {}", notice.text);
    }
}
