//! Terminal chat against the same memory pipeline as the HTTP API.
//!
//! Usage: `memchat [USER_ID]` (falls back to `MEMCHAT_USER_ID`, then `P101`).
//! Type `exit` or send EOF to quit.

use anyhow::Result;
use futures::StreamExt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memchat_api::core::{config::Settings, orchestrator::ChatOrchestrator};
use memchat_api::models::chat::DEFAULT_USER_ID;

const PROMPT: &str = ">> ";

/// Upper bound on waiting for summaries and extractions at exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Logs go to stderr so they do not interleave with the reply
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let user_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MEMCHAT_USER_ID").ok())
        .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

    let settings = Settings::new()?;
    let orchestrator = ChatOrchestrator::from_settings(&settings).await?;
    info!("REPL started for user {}", user_id);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        let mut tokens = orchestrator.chat_stream(message.to_string(), user_id.clone());
        while let Some(token) = tokens.next().await {
            match token {
                Ok(token) => {
                    stdout.write_all(token.as_bytes()).await?;
                    stdout.flush().await?;
                },
                Err(e) => {
                    stdout.write_all(b"\n").await?;
                    eprintln!("error: {e}");
                    break;
                },
            }
        }
        stdout.write_all(b"\n").await?;
    }

    if tokio::time::timeout(DRAIN_TIMEOUT, orchestrator.tasks().wait_idle())
        .await
        .is_err()
    {
        warn!("Exiting with background memory tasks still running");
    }

    Ok(())
}
