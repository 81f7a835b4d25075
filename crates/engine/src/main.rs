use std::sync::Arc;

use blocksync_engine::protocol::{Caret, Selection};
use blocksync_engine::transport::{MemoryHub, SharedTransport};
use blocksync_engine::{Block, CollabClient, Config, Document};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn paragraph(id: &str, text: &str) -> Block {
    Block::new(id, "core/paragraph").with_attribute("content", text)
}

fn client(hub: &MemoryHub, config: &Config, name: &str) -> anyhow::Result<CollabClient> {
    let mut config = config.clone();
    config.user.name = name.to_string();
    let transport: SharedTransport = Arc::new(hub.transport());
    CollabClient::new(transport, &config)
}

/// Deliver queued traffic until both peers are idle
async fn settle(a: &mut CollabClient, b: &mut CollabClient) -> anyhow::Result<()> {
    while a.pump_pending().await? + b.pump_pending().await? > 0 {}
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging (tracing)
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    // Handle --version and --help
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-v" => {
                println!("blocksync-sim {VERSION}");
                return Ok(());
            }
            "--help" | "-h" => {
                println!("blocksync-sim - two-peer collaborative editing simulation");
                println!();
                println!("USAGE:");
                println!("    blocksync-sim [OPTIONS]");
                println!();
                println!("Runs two peers over an in-process hub: one shares a document,");
                println!("the other joins, both edit concurrently, one undoes, and the");
                println!("converged document is printed as JSON.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version");
                println!();
                println!("CONFIG:");
                println!("    ~/.config/blocksync/config.toml");
                return Ok(());
            }
            other => {
                eprintln!("unknown argument: {other} (see --help)");
                std::process::exit(2);
            }
        }
    }

    let config = Config::load();
    tracing::info!(
        path = %Config::default_config_path().display(),
        channel = %config.sync.channel,
        "configuration loaded"
    );

    let hub = MemoryHub::new();
    let mut alice = client(&hub, &config, "Alice")?;
    let mut bob = client(&hub, &config, "Bob")?;

    let initial = Document {
        title: "Meeting notes".to_string(),
        blocks: vec![paragraph("intro", "Agenda")],
        comments: Vec::new(),
    };
    alice.join(&initial).await?;
    bob.join(&Document::default()).await?;
    settle(&mut alice, &mut bob).await?;

    // Concurrent edits: Alice appends, Bob retitles and edits the intro.
    let mut from_alice = alice.content();
    from_alice.blocks.push(paragraph("a1", "Budget review"));
    alice
        .send_selection(Selection::collapsed(Caret::new("a1", 13).in_attribute("content")))
        .await?;
    alice.submit_change(&from_alice).await?;

    let mut from_bob = bob.content();
    from_bob.title = "Weekly sync".to_string();
    if let Some(intro) = from_bob.blocks.iter_mut().find(|block| block.id == "intro") {
        *intro = paragraph("intro", "Agenda (draft)");
    }
    from_bob.blocks.insert(0, paragraph("b1", "Attendees"));
    bob.submit_change(&from_bob).await?;
    settle(&mut alice, &mut bob).await?;

    // Bob takes back his intro edit.
    let mut retract = bob.content();
    if let Some(intro) = retract.blocks.iter_mut().find(|block| block.id == "intro") {
        *intro = paragraph("intro", "Agenda");
    }
    bob.submit_change(&retract).await?;
    let restored = bob.undo().await?;
    tracing::info!(restored = ?restored, "bob undid his last edit");
    settle(&mut alice, &mut bob).await?;

    let converged = alice.content() == bob.content();
    println!("{}", serde_json::to_string_pretty(&alice.content())?);
    eprintln!("converged: {converged}");

    alice.disconnect().await?;
    bob.disconnect().await?;

    if !converged {
        anyhow::bail!("replicas diverged");
    }
    Ok(())
}
