mod render;

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nexus_client::prelude::*;
use nexus_core::config::ClientConfig;
use nexus_core::error::{NexusError, Result};
use nexus_history::prelude::*;

use crate::render::{AnswerPrinter, sources_block, transcript};

const HELP: &str = "Commands: /new starts a new chat, /history shows the conversation, /quit exits.";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus_cli=info,nexus_client=info".into()),
        )
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(
        base_url = %config.base_url,
        session_id = %config.session_id,
        "Starting NexusAI chat"
    );

    let transport = HttpChatTransport::new(&config)?;
    let gateway = HttpHistoryGateway::new(&config)?;
    let controller = ChatController::new(config, Arc::new(transport), Arc::new(gateway));

    controller.load_history().await;
    println!("{}", transcript(&controller.session()));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await.map_err(io_error)? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/help" => println!("{HELP}"),
            "/history" => println!("{}", transcript(&controller.session())),
            "/new" => {
                if controller.new_chat().await {
                    println!("{}", transcript(&controller.session()));
                } else {
                    println!("Could not start a new chat, see log for details.");
                }
            }
            message => ask(&controller, message).await?,
        }
    }

    controller.save_history();
    controller.flush_history().await;
    Ok(())
}

/// Submit one message and print the answer as it streams in.
async fn ask(controller: &ChatController, message: &str) -> Result<()> {
    let mut rx = controller.subscribe();
    let mut printer = AnswerPrinter::new();
    print!("nexus> ");

    let submit = controller.submit(message);
    tokio::pin!(submit);
    let outcome = loop {
        tokio::select! {
            outcome = &mut submit => break outcome?,
            changed = rx.changed() => {
                if changed.is_err() {
                    continue;
                }
                let text = rx.borrow_and_update().last().map(|t| t.text.clone());
                if let Some(delta) = text.and_then(|t| printer.update(&t)) {
                    print!("{delta}");
                    std::io::stdout().flush().map_err(io_error)?;
                }
            }
        }
    };

    let turn = match outcome {
        SubmitOutcome::Completed(turn) | SubmitOutcome::Failed { turn, .. } => turn,
        SubmitOutcome::Rejected(reason) => {
            println!("(not sent: {reason:?})");
            return Ok(());
        }
    };
    if let Some(delta) = printer.update(&turn.text) {
        print!("{delta}");
    }
    println!();
    if let Some(block) = sources_block(&turn) {
        println!("{block}");
    }
    Ok(())
}

fn prompt() -> Result<()> {
    print!("you> ");
    std::io::stdout().flush().map_err(io_error)
}

fn io_error(e: std::io::Error) -> NexusError {
    NexusError::Other(format!("terminal I/O failed: {e}"))
}
