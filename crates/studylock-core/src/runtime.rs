//! Foreground daemon.
//!
//! One select loop owns the [`SessionController`] and is the only place
//! that mutates it. Ticks come from a tokio interval; elapsed time is
//! measured on the injected [`Clock`]. Blocking calls run on a dedicated
//! worker (each call on the blocking pool, bounded by a timeout) and their
//! results come back over a channel. Document writes go through a single
//! writer task so they reach disk in the order they were issued.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, ElapsedCounter};
use crate::enforcement::{BlockCommand, BlockingCapability};
use crate::error::{BlockError, CoreError, StoreError};
use crate::events::{Event, NotificationSink};
use crate::session::{Effect, SessionController};
use crate::storage::{PersistQueue, PersistRequest, RetryPolicy, SessionConfig, Store};

/// How long shutdown waits for in-flight blocking calls and writes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonOptions {
    pub tick_interval: Duration,
    pub sweep_interval: Duration,
    pub blocking_timeout: Duration,
    pub retry: RetryPolicy,
}

impl DaemonOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.daemon.tick_interval_ms.max(1)),
            sweep_interval: Duration::from_secs(config.blocking.process_sweep_secs.max(1)),
            blocking_timeout: Duration::from_secs(config.blocking.timeout_secs.max(1)),
            retry: RetryPolicy::default(),
        }
    }
}

/// A request from outside the loop (console, IPC, tests).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    SkipBreak,
    Override(String),
    UpdateConfig(Box<SessionConfig>),
    Status,
}

#[derive(Debug)]
pub struct Control {
    command: Command,
    reply: oneshot::Sender<Result<Event, CoreError>>,
}

/// Sends commands to a running daemon.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    tx: mpsc::Sender<Control>,
}

impl DaemonHandle {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Control>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Run `command` and return the resulting status snapshot.
    ///
    /// # Errors
    /// The command's rejection, or `Io` if the daemon has stopped.
    pub async fn send(&self, command: Command) -> Result<Event, CoreError> {
        let (reply, rx) = oneshot::channel();
        let gone = || CoreError::Io(std::io::Error::other("daemon is not running"));
        self.tx
            .send(Control { command, reply })
            .await
            .map_err(|_| gone())?;
        rx.await.map_err(|_| gone())?
    }
}

enum BlockJob {
    Apply(BlockCommand),
    Sweep,
}

type BlockOutcome = (bool, Result<(), BlockError>);

pub struct Daemon {
    controller: SessionController,
    clock: Arc<dyn Clock>,
    capability: Arc<dyn BlockingCapability>,
    store: Arc<dyn Store>,
    sink: Box<dyn NotificationSink>,
    options: DaemonOptions,
}

impl Daemon {
    pub fn new(
        controller: SessionController,
        clock: Arc<dyn Clock>,
        capability: Arc<dyn BlockingCapability>,
        store: Arc<dyn Store>,
        sink: Box<dyn NotificationSink>,
        options: DaemonOptions,
    ) -> Self {
        Self {
            controller,
            clock,
            capability,
            store,
            sink,
            options,
        }
    }

    /// Run until `shutdown` resolves or the command channel and all workers
    /// are gone. On shutdown a running phase is paused, blocking is released
    /// and pending writes are flushed. Returns the final controller.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Control>,
        shutdown: impl Future<Output = ()>,
    ) -> SessionController {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
        let worker = tokio::spawn(blocking_worker(
            self.capability.clone(),
            job_rx,
            outcome_tx,
            self.options.blocking_timeout,
        ));

        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let (failure_tx, mut failures) = mpsc::unbounded_channel();
        let writer = tokio::spawn(writer_task(
            self.store.clone(),
            persist_rx,
            failure_tx,
            self.options.retry,
        ));

        let mut ticker = tokio::time::interval(self.options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweeper = tokio::time::interval(self.options.sweep_interval);
        sweeper.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut elapsed = ElapsedCounter::new();
        elapsed.take(self.clock.monotonic_seconds());

        info!(tick_ms = self.options.tick_interval.as_millis() as u64, "daemon started");
        self.dispatch(&job_tx, &persist_tx);

        tokio::pin!(shutdown);
        let mut commands_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.advance(&mut elapsed);
                }
                control = commands.recv(), if commands_open => match control {
                    Some(Control { command, reply }) => {
                        self.advance(&mut elapsed);
                        let result = self.handle(command);
                        // Caller may have gone away; the command still applied.
                        let _ = reply.send(result);
                    }
                    None => {
                        debug!("command channel closed");
                        commands_open = false;
                    }
                },
                Some((target, result)) = outcomes.recv() => {
                    let now = self.clock.now();
                    self.controller.blocking_result(target, result, now);
                }
                Some(err) = failures.recv() => {
                    let now = self.clock.now();
                    self.controller.persistence_failed(&err, now);
                }
                _ = sweeper.tick() => {
                    if self.controller.blocking_active() == Some(true) {
                        let _ = job_tx.send(BlockJob::Sweep);
                    }
                }
            }
            self.dispatch(&job_tx, &persist_tx);
        }

        self.advance(&mut elapsed);
        let now = self.clock.now();
        self.controller.shutdown(now);
        self.dispatch(&job_tx, &persist_tx);
        drop(job_tx);
        drop(persist_tx);

        match tokio::time::timeout(DRAIN_TIMEOUT, worker).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "blocking worker panicked"),
            Err(_) => warn!("blocking worker did not finish before exit"),
        }
        while let Ok((target, result)) = outcomes.try_recv() {
            self.controller.blocking_result(target, result, now);
        }
        match tokio::time::timeout(DRAIN_TIMEOUT, writer).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "writer task panicked"),
            Err(_) => warn!("writer did not flush before exit"),
        }
        // Only notifications can be left at this point.
        for effect in self.controller.drain_effects() {
            if let Effect::Notify(event) = effect {
                self.sink.notify(&event);
            }
        }
        info!("daemon stopped");
        self.controller
    }

    fn advance(&mut self, elapsed: &mut ElapsedCounter) {
        let secs = elapsed.take(self.clock.monotonic_seconds());
        self.controller.tick(secs, self.clock.now());
    }

    fn handle(&mut self, command: Command) -> Result<Event, CoreError> {
        let now = self.clock.now();
        match command {
            Command::Start => self.controller.start(now)?,
            Command::Pause => self.controller.pause(now)?,
            Command::Resume => self.controller.resume(now)?,
            Command::Stop => self.controller.stop(now)?,
            Command::SkipBreak => self.controller.skip_break(now)?,
            Command::Override(password) => self.controller.request_override(&password, now)?,
            Command::UpdateConfig(config) => self.controller.update_config(*config, now)?,
            Command::Status => {}
        }
        Ok(self.controller.status(now))
    }

    /// Route queued effects to their workers. Never waits.
    fn dispatch(
        &mut self,
        jobs: &mpsc::UnboundedSender<BlockJob>,
        writes: &mpsc::UnboundedSender<PersistRequest>,
    ) {
        for effect in self.controller.drain_effects() {
            match effect {
                Effect::Block(command) => {
                    let target = command.target();
                    if jobs.send(BlockJob::Apply(command)).is_err() {
                        let now = self.clock.now();
                        self.controller.blocking_result(
                            target,
                            Err(BlockError::Unavailable("worker stopped".into())),
                            now,
                        );
                    }
                }
                Effect::Persist(request) => {
                    if writes.send(request).is_err() {
                        warn!("writer stopped, dropping write");
                    }
                }
                Effect::Notify(event) => self.sink.notify(&event),
            }
        }
    }
}

/// A capability call that may still be running on the blocking pool.
enum Bounded {
    Done(Result<(), BlockError>),
    /// Exceeded the limit. The call keeps running and must be awaited
    /// before the capability is touched again.
    TimedOut(JoinHandle<Result<(), BlockError>>),
}

/// Run one capability call on the blocking pool, bounded by `limit`.
async fn run_bounded<F>(
    capability: Arc<dyn BlockingCapability>,
    limit: Duration,
    call: F,
) -> Bounded
where
    F: FnOnce(&dyn BlockingCapability) -> Result<(), BlockError> + Send + 'static,
{
    let mut task = tokio::task::spawn_blocking(move || call(capability.as_ref()));
    match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => Bounded::Done(flatten(joined)),
        Err(_) => Bounded::TimedOut(task),
    }
}

fn flatten(joined: Result<Result<(), BlockError>, JoinError>) -> Result<(), BlockError> {
    joined.unwrap_or_else(|join| Err(BlockError::Unavailable(join.to_string())))
}

/// Executes blocking jobs one at a time. A timed-out call is reported as
/// a failure right away, then awaited to completion and reported again
/// with its real outcome before the next job starts, so the capability
/// always ends in the state of the last job.
async fn blocking_worker(
    capability: Arc<dyn BlockingCapability>,
    mut jobs: mpsc::UnboundedReceiver<BlockJob>,
    outcomes: mpsc::UnboundedSender<BlockOutcome>,
    limit: Duration,
) {
    let report = |outcome: BlockOutcome| {
        if outcomes.send(outcome).is_err() {
            debug!("daemon loop gone, dropping blocking result");
        }
    };

    while let Some(job) = jobs.recv().await {
        match job {
            BlockJob::Apply(command) => {
                let target = command.target();
                let call = run_bounded(capability.clone(), limit, move |cap| {
                    command.execute(cap)
                });
                match call.await {
                    Bounded::Done(result) => report((target, result)),
                    Bounded::TimedOut(task) => {
                        report((target, Err(BlockError::Timeout(limit.as_secs()))));
                        let late = flatten(task.await);
                        debug!(active = target, ok = late.is_ok(), "slow blocking call finished");
                        report((target, late));
                    }
                }
            }
            BlockJob::Sweep => {
                let result = match run_bounded(capability.clone(), limit, |cap| cap.sweep()).await {
                    Bounded::Done(result) => result,
                    Bounded::TimedOut(task) => {
                        warn!(limit_secs = limit.as_secs(), "sweep is slow, waiting for it");
                        flatten(task.await)
                    }
                };
                if let Err(err) = result {
                    warn!(error = %err, "sweep failed");
                }
            }
        }
    }
}

async fn writer_task(
    store: Arc<dyn Store>,
    mut requests: mpsc::UnboundedReceiver<PersistRequest>,
    failures: mpsc::UnboundedSender<StoreError>,
    policy: RetryPolicy,
) {
    let queue = Arc::new(Mutex::new(PersistQueue::new()));
    while let Some(request) = requests.recv().await {
        let mut attempt = 1;
        loop {
            let result = {
                let store = store.clone();
                let queue = queue.clone();
                let request = request.clone();
                tokio::task::spawn_blocking(move || {
                    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                    queue.attempt(store.as_ref(), &request)
                })
                .await
            };
            let err = match result {
                Ok(Ok(())) => break,
                Ok(Err(err)) => err,
                Err(join) => StoreError::Write {
                    path: request.document().into(),
                    message: join.to_string(),
                },
            };
            if attempt >= policy.attempts {
                error!(document = request.document(), attempts = attempt, error = %err, "write failed");
                let _ = failures.send(StoreError::PersistenceWriteFailed {
                    document: request.document(),
                    attempts: attempt,
                    message: err.to_string(),
                });
                break;
            }
            let delay = policy.delay_after(attempt);
            warn!(document = request.document(), attempt, ?delay, error = %err, "write failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
    debug!("writer drained");
}
