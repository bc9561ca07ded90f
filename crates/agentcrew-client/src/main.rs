//! Interactive terminal chat against a running AgentCrew server.

use std::io::Write;

use agentcrew_client::{AgentCompletionsClient, AUTHOR_BREAK};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "http://localhost:5000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let base_url = match args.get(1).map(String::as_str) {
        Some("--help" | "-h" | "help") => {
            println!("Usage: agentcrew-chat [server-url]");
            println!();
            println!("Server URL defaults to $AGENTCREW_URL or {}.", DEFAULT_URL);
            println!("Type a prompt and press enter. /clear resets the transcript, /quit exits.");
            return Ok(());
        }
        Some(url) => url.to_string(),
        None => std::env::var("AGENTCREW_URL").unwrap_or_else(|_| DEFAULT_URL.to_string()),
    };

    let mut client = AgentCompletionsClient::new(base_url.as_str());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Connected to {}", base_url);

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        match prompt {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                client.clear_history();
                println!("Transcript cleared.");
                continue;
            }
            _ => {}
        }

        let mut replies = client.complete_streaming(prompt);
        while let Some(piece) = replies.next().await {
            match piece {
                Ok(text) => {
                    print!("{}", text.replace(AUTHOR_BREAK, "\n"));
                    std::io::stdout().flush()?;
                }
                Err(e) => {
                    eprintln!("\nerror: {}", e);
                    break;
                }
            }
        }
        println!();
    }

    Ok(())
}
