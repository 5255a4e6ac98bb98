use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use guildkeep::config::Config;
use guildkeep::dispatch::{Context, Dispatcher};
use guildkeep::events::InboundEvent;
use guildkeep::logging::{log, obj, v_str, Domain, Level};
use guildkeep::schema::Defaults;
use guildkeep::store::retry::retry_async;
use guildkeep::store::{BackendKind, PathStore, Paths};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load();
    let kind = BackendKind::from_env();
    let store = PathStore::new(kind.build(&cfg)?);

    retry_async(&cfg.startup_retry(), "store_ping", || store.ping())
        .await
        .context("store did not answer the startup ping")?;

    let paths = Paths::new(&cfg.root)?;
    let dispatcher = Dispatcher::with_default_handlers(Context::new(
        store,
        paths,
        Arc::new(Defaults::builtin()),
    ));
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("backend", v_str(&format!("{:?}", kind).to_lowercase())),
            ("root", v_str(&cfg.root)),
        ]),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut handled: u64 = 0;
    let mut failed: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: InboundEvent = match serde_json::from_str(line) {
            Ok(ev) => ev,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Dispatch,
                    "bad_event",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                continue;
            }
        };

        let outcome = dispatcher.dispatch(&event).await;
        handled += 1;
        if outcome.error.is_some() {
            failed += 1;
        }
        for action in &outcome.actions {
            let mut out = serde_json::to_string(action)?;
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
        }
        stdout.flush().await?;
    }

    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[("handled", json!(handled)), ("failed", json!(failed))]),
    );
    Ok(())
}
