//! Honeycomb 命令行入口
//!
//! 逐行读取 stdin 作为用户输入，本地保存对话历史（只追加），输出答案或澄清问题；EOF 或 /quit 退出。

use std::path::PathBuf;

use anyhow::Context;
use honeycomb::config::{load_config, AppConfig};
use honeycomb::conversation::Message;
use honeycomb::{OrchestrationResult, OrchestratorBuilder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        eprintln!("Config load failed ({e}), using defaults");
        AppConfig::default()
    });
    honeycomb::observability::init(cfg.app.log_json);

    let orchestrator = OrchestratorBuilder::from_config(cfg)?
        .build()
        .context("Failed to build orchestrator")?;

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }

        let reply = match orchestrator.handle_turn(input, &history).await {
            Ok(OrchestrationResult::Answer { text, sources_used }) => {
                tracing::debug!(sources = ?sources_used, "Answer ready");
                text
            }
            Ok(OrchestrationResult::Clarification { text }) => text,
            Err(e) => {
                tracing::error!(kind = e.kind(), "Turn failed: {}", e);
                format!("Sorry, I could not answer that right now ({e}).")
            }
        };

        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        history.push(Message::user(input));
        history.push(Message::assistant(reply));
    }

    Ok(())
}
