//! `studylock run`: the foreground daemon.
//!
//! Owns the session for as long as it runs. Commands arrive as lines on
//! stdin (`start`, `pause`, `override <password>`, `set <key> <value>`, ...)
//! and every reply is printed as a JSON status line. Ctrl-C, SIGTERM or
//! `quit` pause a running phase, release blocking and flush the documents.

use std::sync::Arc;

use studylock_core::{
    BlockingCapability, Clock, Command, Daemon, DaemonHandle, DaemonOptions, FileStore,
    SessionConfig, SessionController, Store, SystemClock,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::common::{blocker_for, CmdResult};
use crate::lock::DaemonLock;
use crate::notify::LogSink;

#[derive(Debug, PartialEq)]
enum ConsoleInput {
    Send(Command),
    Quit,
    Empty,
}

pub fn run(dry_run: bool) -> CmdResult {
    let store = FileStore::open_default()?;
    let _lock = DaemonLock::acquire(store.dir())?;

    let clock = Arc::new(SystemClock::new());
    let config = store.load_config()?.unwrap_or_default();
    let controller = SessionController::restore(
        config.clone(),
        store.load_snapshot()?,
        store.load_history()?,
        clock.now(),
    );
    info!(
        dir = %store.dir().display(),
        phase = %controller.phase(),
        dry_run,
        "starting daemon"
    );

    let blocker: Arc<dyn BlockingCapability> = Arc::from(blocker_for(&config, dry_run));
    let options = DaemonOptions::from_config(&config);
    let store: Arc<dyn Store> = Arc::new(store);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let daemon = Daemon::new(controller, clock, blocker, store, Box::new(LogSink), options);
        let (handle, commands) = DaemonHandle::channel(16);
        let quit = Arc::new(Notify::new());
        let console_task = tokio::spawn(console(handle, config, quit.clone()));

        let controller = daemon.run(commands, shutdown_signal(quit)).await;
        console_task.abort();
        info!(phase = %controller.phase(), "session saved");
    });
    Ok(())
}

async fn console(handle: DaemonHandle, mut config: SessionConfig, quit: Arc<Notify>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console input closed");
                return;
            }
            Err(err) => {
                warn!(error = %err, "console read failed");
                return;
            }
        };

        let command = match parse_line(&line, &config) {
            Ok(ConsoleInput::Send(command)) => command,
            Ok(ConsoleInput::Quit) => {
                quit.notify_one();
                return;
            }
            Ok(ConsoleInput::Empty) => continue,
            Err(message) => {
                eprintln!("error: {message}");
                continue;
            }
        };

        let pending = match &command {
            Command::UpdateConfig(updated) => Some((**updated).clone()),
            _ => None,
        };
        match handle.send(command).await {
            Ok(status) => {
                if let Some(updated) = pending {
                    config = updated;
                }
                match serde_json::to_string(&status) {
                    Ok(json) => println!("{json}"),
                    Err(err) => warn!(error = %err, "could not encode status"),
                }
            }
            Err(err) => eprintln!("error: {err}"),
        }
    }
}

fn parse_line(line: &str, config: &SessionConfig) -> Result<ConsoleInput, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ConsoleInput::Empty);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (verb, rest.as_slice()) {
        ("start", []) => Command::Start,
        ("pause", []) => Command::Pause,
        ("resume", []) => Command::Resume,
        ("stop", []) => Command::Stop,
        ("skip-break", []) => Command::SkipBreak,
        ("status", []) => Command::Status,
        ("override", [password]) => Command::Override((*password).to_string()),
        ("set", [key, value @ ..]) if !value.is_empty() => {
            let mut updated = config.clone();
            updated
                .set(key, &value.join(" "))
                .map_err(|e| e.to_string())?;
            Command::UpdateConfig(Box::new(updated))
        }
        ("quit" | "exit", []) => return Ok(ConsoleInput::Quit),
        _ => return Err(format!("unrecognized command: {}", line.trim())),
    };
    Ok(ConsoleInput::Send(command))
}

async fn shutdown_signal(quit: Arc<Notify>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = quit.notified() => {}
    }
}
