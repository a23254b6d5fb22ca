//! Pepevault host - the background dispatcher over JSON lines.
//!
//!   pepevault serve                    → one request per stdin line, one response per stdout line
//!   pepevault phrase                   → fresh 12-word mnemonic
//!   pepevault address <phrase> [index] → derived address of child `index`
//!
//! `serve` input lines are `{"id"?, "message", "data"?, "sender"?}`. Output
//! lines are either `{"id", "response"}` or `{"event", ...}` for popups, tab
//! messages and notifications the embedding UI must act on.
//!
//! Configuration comes from `PEPEVAULT_*` environment variables, optionally
//! loaded from `.env`.

use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use pepevault::keys::{generate_child, generate_phrase, generate_root};
use pepevault::logging::init_logging;
use pepevault::{
    install_signal_handlers, ExtensionUi, Notification, PopupRequest, TabMessage, VaultConfig, VaultResult,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

fn main() {
    load_dotenv();
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("serve") => cmd_serve(),
        Some("phrase") => cmd_phrase(),
        Some("address") => cmd_address(&args[1..]),
        Some("--version") | Some("-V") => {
            println!("pepevault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(cmd) => Err(anyhow!("unknown command: {cmd}")),
    };

    if let Err(err) = result {
        eprintln!("{}", json!({ "error": format!("{err:#}") }));
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"pepevault - Pepecoin wallet background host

USAGE:
    pepevault <command> [args]

COMMANDS:
    serve                      Run the dispatcher on stdin/stdout JSON lines
    phrase                     Print a new mnemonic
    address <phrase> [index]   Print the address of child <index> (default 0)

ENVIRONMENT:
    PEPEVAULT_APP              Application name (data dir suffix)
    PEPEVAULT_DATA_DIR         Directory of the persisted local record
    PEPEVAULT_INDEXER_URL      Indexer base URL
    PEPEVAULT_CHAIN            pepecoin | bitcoin-legacy
    PEPEVAULT_FEE_RATE         Fee rate per size unit
    PEPEVAULT_DUST_THRESHOLD   Change at or below this is forfeited to fee
    PEPEVAULT_LOG_JSON         1 for JSON logs on stderr
    RUST_LOG                   Log filter (default: info)
"#
    );
}

/// Fill unset environment variables from `./.env`.
fn load_dotenv() {
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && env::var(key.trim()).is_err() {
                env::set_var(key.trim(), value);
            }
        }
    }
}

fn cmd_phrase() -> Result<()> {
    println!("{}", generate_phrase()?);
    Ok(())
}

fn cmd_address(args: &[String]) -> Result<()> {
    let phrase = args.first().context("usage: pepevault address <phrase> [index]")?;
    let index = match args.get(1) {
        Some(raw) => raw.parse().with_context(|| format!("invalid index {raw:?}"))?,
        None => 0,
    };
    let params = VaultConfig::from_env().params;
    let root = generate_root(phrase)?;
    let child = generate_child(&root, index, &params)?;
    println!("{}", child.address(&params));
    Ok(())
}

/// Emits UI side effects as event lines for the embedding process.
struct StdoutUi;

fn emit(line: Value) {
    println!("{line}");
}

#[async_trait]
impl ExtensionUi for StdoutUi {
    async fn open_popup(&self, request: PopupRequest) -> VaultResult<bool> {
        emit(json!({ "event": "openPopup", "popup": request }));
        Ok(true)
    }

    async fn send_to_tab(&self, tab_id: i64, message: TabMessage) -> VaultResult<()> {
        emit(json!({ "event": "tabMessage", "tabId": tab_id, "message": message }));
        Ok(())
    }

    async fn notify(&self, notification: Notification) -> VaultResult<()> {
        emit(json!({ "event": "notification", "notification": notification }));
        Ok(())
    }
}

fn cmd_serve() -> Result<()> {
    let config = VaultConfig::from_env();
    let runtime = tokio::runtime::Runtime::new().context("failed to create runtime")?;

    runtime.block_on(async {
        let dispatcher = config.open_dispatcher(Arc::new(StdoutUi))?;
        let shutdown = install_signal_handlers();
        let mut stop = shutdown.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!(app = %config.app, "pepevault serving on stdin/stdout");

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read stdin")?,
                _ = stop.recv() => break,
            };
            let Some(line) = line else {
                info!("stdin closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let envelope: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(err) => {
                    emit(json!({ "id": Value::Null, "response": {
                        "status": "err", "kind": "validation", "message": format!("invalid JSON: {err}")
                    }}));
                    continue;
                }
            };
            // Handled in arrival order; handlers never wait on a user decision.
            let id = envelope.get("id").cloned().unwrap_or(Value::Null);
            let response = dispatcher.dispatch_value(envelope).await;
            emit(json!({ "id": id, "response": response }));
        }

        shutdown.trigger().await;
        info!("pepevault stopped");
        Ok::<_, anyhow::Error>(())
    })
}
