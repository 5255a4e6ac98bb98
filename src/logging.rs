//! Structured JSON-lines logging.
//!
//! Every record is one JSON object per line with a stable envelope:
//! `ts`, `run_id`, `seq`, `lvl`, `component`, `event`, `msg`, the correlation
//! keys (`community_id`, `member_id`, `poll_id`) lifted to the top level, and
//! everything else under `data`.
//!
//! Records go to stderr because stdout carries outbound actions. When `LOG_DIR`
//! is set, they are also appended under `{LOG_DIR}/{run_id}/`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::reconcile::ReconcileReport;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Store,     // Path reads and writes
    Reconcile, // Default schema synchronization
    Leveling,  // XP grants, level ups
    Poll,      // Poll creation, votes
    Voice,     // Ephemeral voice rooms
    Ticket,    // Support tickets
    Dispatch,  // Event routing, handler failures
    System,    // Startup, shutdown
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Store => "store",
            Domain::Reconcile => "reconcile",
            Domain::Leveling => "leveling",
            Domain::Poll => "poll",
            Domain::Voice => "voice",
            Domain::Ticket => "ticket",
            Domain::Dispatch => "dispatch",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS is a comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct FileSink {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

impl FileSink {
    fn open(base: &Path, run_id: &str) -> std::io::Result<(PathBuf, Self)> {
        let run_dir = base.join(run_id);
        create_dir_all(&run_dir)?;
        std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
            })
            .to_string(),
        )?;
        let events = File::create(run_dir.join("events.jsonl"))?;
        let trace = File::create(run_dir.join("trace.jsonl"))?;
        Ok((
            run_dir,
            Self {
                events: Mutex::new(BufWriter::new(events)),
                trace: Mutex::new(BufWriter::new(trace)),
            },
        ))
    }

    fn write(&self, level: Level, line: &str) {
        match level {
            Level::Trace | Level::Debug => write_line(&self.trace, line),
            _ => write_line(&self.events, line),
        }
    }
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    files: Option<FileSink>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let files = std::env::var("LOG_DIR").ok().and_then(|base| {
            match FileSink::open(Path::new(&base), &run_id) {
                Ok((_, sink)) => Some(sink),
                Err(err) => {
                    eprintln!("[log] failed to open log dir {}: {}", base, err);
                    None
                }
            }
        });
        RunContext { run_id, files }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["auth", "auth_token", "token", "credential"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["community_id", "member_id", "poll_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    let ctx = ensure_run_context();
    let line = format_record(&ctx.run_id, level, domain.as_str(), event, fields);
    if let Some(files) = &ctx.files {
        files.write(level, &line);
    }
    eprintln!("{}", line);
}

fn format_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> String {
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_store_op(op: &str, path: &str, skipped: bool) {
    log(
        Level::Trace,
        Domain::Store,
        op,
        obj(&[("path", v_str(path)), ("skipped", Value::Bool(skipped))]),
    );
}

pub fn log_reconcile_report(scope: &str, community_id: Option<&str>, report: &ReconcileReport) {
    let mut fields = obj(&[
        ("scope", v_str(scope)),
        ("communities_created", json!(report.communities_created)),
        ("communities_extended", json!(report.communities_extended)),
        ("users_created", json!(report.users_created)),
        ("users_extended", json!(report.users_extended)),
        ("keys_inserted", json!(report.keys_inserted)),
        ("writes", json!(report.writes)),
    ]);
    if let Some(id) = community_id {
        fields.insert("community_id".to_string(), v_str(id));
    }
    log(Level::Info, Domain::Reconcile, "reconciled", fields);
}

pub fn log_level_up(community_id: &str, member_id: &str, from: u64, to: u64, xp: u64) {
    log(
        Level::Info,
        Domain::Leveling,
        "level_up",
        obj(&[
            ("community_id", v_str(community_id)),
            ("member_id", v_str(member_id)),
            ("from_level", json!(from)),
            ("to_level", json!(to)),
            ("xp", json!(xp)),
        ]),
    );
}

pub fn log_vote(community_id: &str, poll_id: &str, op: &str, choice: Option<usize>) {
    log(
        Level::Debug,
        Domain::Poll,
        op,
        obj(&[
            ("community_id", v_str(community_id)),
            ("poll_id", v_str(poll_id)),
            ("choice", choice.map(|c| json!(c)).unwrap_or(Value::Null)),
        ]),
    );
}

pub fn log_handler_error(event_kind: &str, error_kind: &str, err: &str) {
    log(
        Level::Error,
        Domain::Dispatch,
        "handler_failed",
        obj(&[
            ("event_kind", v_str(event_kind)),
            ("error_kind", v_str(error_kind)),
            ("msg", v_str(err)),
        ]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

// =============================================================================
// Tests
// =============================================================================
