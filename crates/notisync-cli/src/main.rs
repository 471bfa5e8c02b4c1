//! notisync CLI
//!
//! Drives notisync-core against the in-process backend, either through a
//! canned walkthrough or a scripted sequence of steps.
//!
//! ## Usage
//!
//! ```bash
//! # Walk through login, fetch, mark-read and logout
//! notisync demo
//!
//! # Replay a JSON script and print every step's result plus the final view
//! notisync replay script.json
//!
//! # Use a custom engine configuration
//! notisync --config engine.json replay script.json
//! ```
//!
//! ## Script format
//!
//! Either a bare array of steps, or an object that also sets up the backend:
//!
//! ```json
//! {
//!   "users": [{ "id": "root", "role": "admin", "token": "tok-root" }],
//!   "seed": [{ "title": "Welcome", "message": "Hello" }],
//!   "steps": [
//!     { "step": "login", "token": "tok-root" },
//!     { "step": "fetch" },
//!     { "step": "mark_read", "id": "n1" },
//!     { "step": "fail_next", "status": 500, "message": "boom" },
//!     { "step": "archive", "id": "n1" },
//!     { "step": "list", "include_archived": true, "priority": "high" },
//!     { "step": "bulk", "action": "unarchive", "ids": ["n1"] },
//!     { "step": "wait", "ms": 200 },
//!     { "step": "logout" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notisync_core::{
    AuthSignal, BulkAction, CacheView, CreateNotification, EngineConfig, FetchOutcome,
    LifecycleController, ListQuery, LocalTransport, NotificationId, OpResult, Role, SyncEngine, SyncEvent,
    SyncResult, TransportError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// How long the demo waits for an event before giving up
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// notisync - notification sync engine
#[derive(Parser)]
#[command(name = "notisync")]
#[command(version = "0.1.0")]
#[command(about = "Auth-aware notification sync engine")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the login / fetch / mark-read / logout walkthrough
    Demo,

    /// Replay a JSON script of steps against the local backend
    Replay {
        /// Path to the script file
        script: PathBuf,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// Script format
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Script {
    Steps(Vec<Step>),
    Scenario(Scenario),
}

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default = "default_users")]
    users: Vec<ScriptUser>,
    #[serde(default)]
    seed: Vec<CreateNotification>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct ScriptUser {
    id: String,
    role: String,
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    Login {
        token: String,
    },
    Logout,
    Fetch,
    /// Filtered listing that leaves the view untouched
    List {
        #[serde(flatten)]
        query: ListQuery,
    },
    Create {
        #[serde(flatten)]
        notification: CreateNotification,
    },
    MarkRead {
        id: NotificationId,
    },
    MarkAllRead,
    Archive {
        id: NotificationId,
    },
    Delete {
        id: NotificationId,
    },
    Bulk {
        action: BulkAction,
        ids: Vec<NotificationId>,
    },
    FailNext {
        #[serde(default)]
        status: Option<u16>,
        #[serde(default = "default_failure_message")]
        message: String,
    },
    Wait {
        ms: u64,
    },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Login { .. } => "login",
            Step::Logout => "logout",
            Step::Fetch => "fetch",
            Step::List { .. } => "list",
            Step::Create { .. } => "create",
            Step::MarkRead { .. } => "mark_read",
            Step::MarkAllRead => "mark_all_read",
            Step::Archive { .. } => "archive",
            Step::Delete { .. } => "delete",
            Step::Bulk { .. } => "bulk",
            Step::FailNext { .. } => "fail_next",
            Step::Wait { .. } => "wait",
        }
    }
}

fn default_users() -> Vec<ScriptUser> {
    [
        ("alice", "student", "tok-alice"),
        ("bob", "staff", "tok-bob"),
        ("root", "admin", "tok-root"),
    ]
    .into_iter()
    .map(|(id, role, token)| ScriptUser {
        id: id.to_string(),
        role: role.to_string(),
        token: token.to_string(),
    })
    .collect()
}

fn default_failure_message() -> String {
    "injected failure".to_string()
}

/// Replay output: every step's result, the toasts raised, and the final view
#[derive(Debug, Serialize)]
struct ReplayReport {
    steps: Vec<StepReport>,
    toasts: Vec<Value>,
    view: CacheView,
}

#[derive(Debug, Serialize)]
struct StepReport {
    step: &'static str,
    result: OpResult<Value>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn load_script(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let script: Script = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid script {}", path.display()))?;
    Ok(match script {
        Script::Steps(steps) => Scenario {
            users: default_users(),
            seed: Vec::new(),
            steps,
        },
        Script::Scenario(scenario) => scenario,
    })
}

fn to_json<T: Serialize>(result: SyncResult<T>) -> OpResult<Value> {
    match result {
        Ok(data) => match serde_json::to_value(data) {
            Ok(value) => OpResult::ok(value),
            Err(e) => OpResult::err(e.to_string()),
        },
        Err(e) => OpResult::err(e.to_string()),
    }
}

fn fetch_json(outcome: FetchOutcome) -> Value {
    match outcome {
        FetchOutcome::Applied { count, unread } => json!({ "count": count, "unread": unread }),
        FetchOutcome::Discarded => json!("discarded"),
    }
}

fn print_view(label: &str, view: &CacheView) {
    println!("{} ({} items, {} unread)", label, view.items.len(), view.unread_count());
    for n in &view.items {
        let marker = if n.read { " " } else { "●" };
        println!("  {} [{}] {}  ({})", marker, n.kind, n.title, n.id);
    }
}

fn print_toasts(events: &mut broadcast::Receiver<SyncEvent>) {
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Toast { kind, message } = event {
            println!("  toast [{}] {}", kind, message);
        }
    }
}

/// Wait for the first event matching `wanted`
async fn wait_for(
    events: &mut broadcast::Receiver<SyncEvent>,
    wanted: impl Fn(&SyncEvent) -> bool,
) -> Result<SyncEvent> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if wanted(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    anyhow::bail!("Engine event channel closed")
                }
            }
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .context("Timed out waiting for engine event")?
}

// ═══════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════

async fn run_demo(config: EngineConfig) -> Result<()> {
    let transport = Arc::new(LocalTransport::new());
    transport.add_user("alice", Role::Student, "tok-alice");
    transport.seed(CreateNotification::new(
        "Welcome",
        "Your courses are ready",
    ));
    transport.seed(CreateNotification::new(
        "Assignment due",
        "Essay due Friday",
    ));
    transport.set_latency(Duration::from_millis(20));

    let auth = AuthSignal::new();
    let engine = SyncEngine::with_config(transport.clone(), auth.subscribe(), config);
    let mut events = engine.subscribe();
    let mut toasts = engine.subscribe();
    let lifecycle = LifecycleController::new(engine.clone(), auth.subscribe()).spawn();

    println!("notisync demo");
    println!();

    println!("1. Fetch while logged out");
    match engine.fetch().await {
        Ok(_) => println!("  unexpected success"),
        Err(e) => println!("  refused: {}", e),
    }
    println!("  transport calls: {}", transport.calls());
    println!();

    println!("2. Log in as alice");
    auth.login("tok-alice");
    wait_for(&mut events, |e| matches!(e, SyncEvent::Fetched { .. })).await?;
    print_view("  view", &engine.view());
    println!();

    println!("3. Mark the newest notification read");
    if let Some(first) = engine.view().items.first() {
        engine.mark_read(&first.id).await?;
    }
    print_view("  view", &engine.view());
    println!();

    println!("4. Mark all read");
    engine.mark_all_read().await?;
    print_toasts(&mut toasts);
    print_view("  view", &engine.view());
    println!();

    println!("5. Log out");
    auth.logout();
    wait_for(&mut events, |e| *e == SyncEvent::TornDown).await?;
    print_view("  view", &engine.view());
    println!("  state: {}", engine.cache_state());

    lifecycle.unmount().await;
    Ok(())
}

async fn run_replay(config: EngineConfig, script: &Path) -> Result<()> {
    let scenario = load_script(script)?;

    let transport = Arc::new(LocalTransport::new());
    for user in &scenario.users {
        let role: Role = user.role.parse().map_err(anyhow::Error::msg)?;
        transport.add_user(user.id.clone(), role, user.token.clone());
    }
    for payload in scenario.seed {
        transport.seed(payload);
    }

    let auth = AuthSignal::new();
    let engine = SyncEngine::with_config(transport.clone(), auth.subscribe(), config);
    let mut events = engine.subscribe();
    let lifecycle = LifecycleController::new(engine.clone(), auth.subscribe()).spawn();

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for step in scenario.steps {
        let name = step.name();
        tracing::debug!(step = name, "Replaying step");
        let result = match step {
            Step::Login { token } => {
                auth.login(token);
                tokio::task::yield_now().await;
                OpResult::ok(Value::Null)
            }
            Step::Logout => {
                let was_authenticated = engine.can_make_authenticated_request();
                let mut torn_down = engine.subscribe();
                auth.logout();
                if was_authenticated {
                    wait_for(&mut torn_down, |e| *e == SyncEvent::TornDown).await?;
                }
                OpResult::ok(Value::Null)
            }
            Step::Fetch => to_json(engine.fetch().await.map(fetch_json)),
            Step::List { query } => to_json(engine.list(&query).await),
            Step::Create { notification } => to_json(engine.create(&notification).await),
            Step::MarkRead { id } => to_json(engine.mark_read(&id).await),
            Step::MarkAllRead => to_json(engine.mark_all_read().await),
            Step::Archive { id } => to_json(engine.archive(&id).await),
            Step::Delete { id } => to_json(engine.delete(&id).await),
            Step::Bulk { action, ids } => to_json(engine.bulk_action(action, &ids).await),
            Step::FailNext { status, message } => {
                let error = match status {
                    Some(code) => TransportError::http(code, message),
                    None => TransportError::network(message),
                };
                transport.fail_next(error);
                OpResult::ok(Value::Null)
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                OpResult::ok(Value::Null)
            }
        };
        steps.push(StepReport { step: name, result });
    }

    // Unmounting tears the session down; report the view as the script left it
    let view = engine.view();
    lifecycle.unmount().await;

    let mut toasts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Toast { kind, message } = event {
            toasts.push(json!({ "kind": kind, "message": message }));
        }
    }

    let report = ReplayReport {
        steps,
        toasts,
        view,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Demo => run_demo(config).await?,
        Commands::Replay { script } => run_replay(config, &script).await?,
    }

    Ok(())
}
