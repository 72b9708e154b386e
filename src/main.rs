use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fwd_index::core::{FileId, ForwardIndexConfig};
use fwd_index::storage::{ForwardIndex, LogForwardIndex};
use tracing::info;

#[derive(Parser)]
#[command(name = "fwd-index")]
#[command(about = "Inspect and maintain a log-structured forward index", long_about = None)]
struct Cli {
    /// TOML 配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 打印存储统计
    Stats {
        /// log 文件（缺省取配置中的 path）
        log: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// 以 hex 打印某个文件的快照字节
    Get {
        file_id: FileId,
        /// log 文件（缺省取配置中的 path）
        log: Option<PathBuf>,
    },
    /// 只保留存活条目重写 log
    Compact { log: Option<PathBuf> },
    /// 清空 forward index
    Clear { log: Option<PathBuf> },
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        out.push_str(&format!("{:08x}  {}\n", i * 16, hex.join(" ")));
    }
    out
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ForwardIndexConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ForwardIndexConfig::default(),
    };
    let open = |log: Option<PathBuf>| -> anyhow::Result<LogForwardIndex> {
        let path = log.unwrap_or_else(|| config.path.clone());
        LogForwardIndex::open(&path, config.log_options())
            .with_context(|| format!("opening forward index {}", path.display()))
    };

    match cli.command {
        Command::Stats { log, json } => {
            let index = open(log)?;
            let stats = index.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", stats);
            }
            index.close()?;
        }
        Command::Get { file_id, log } => {
            let index = open(log)?;
            match index.get(file_id)? {
                Some(bytes) => {
                    println!("file {}: {} bytes", file_id, bytes.len());
                    print!("{}", hex_dump(bytes.as_slice()));
                }
                None => println!("file {}: no entry", file_id),
            }
            index.close()?;
        }
        Command::Compact { log } => {
            let index = open(log)?;
            let before = index.stats().log_bytes;
            index.compact()?;
            info!(
                "Compaction done: {} -> {}",
                fwd_index::stats::human_bytes(before),
                fwd_index::stats::human_bytes(index.stats().log_bytes)
            );
            index.close()?;
        }
        Command::Clear { log } => {
            let index = open(log)?;
            index.clear()?;
            index.close()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subcommand_falls_back_to_configured_log() {
        for args in [
            vec!["fwd-index", "stats"],
            vec!["fwd-index", "get", "42"],
            vec!["fwd-index", "compact"],
            vec!["fwd-index", "clear"],
        ] {
            let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
            let log = match cli.command {
                Command::Stats { log, .. }
                | Command::Get { log, .. }
                | Command::Compact { log }
                | Command::Clear { log } => log,
            };
            assert!(log.is_none(), "{:?}", args);
        }
    }

    #[test]
    fn get_accepts_explicit_log() {
        let cli =
            Cli::try_parse_from(["fwd-index", "get", "7", "/tmp/fwd/forward.log"]).unwrap();
        match cli.command {
            Command::Get { file_id, log } => {
                assert_eq!(file_id, 7);
                assert_eq!(log, Some(PathBuf::from("/tmp/fwd/forward.log")));
            }
            _ => panic!("expected get"),
        }
    }
}
