//! The process-wide cron scheduler.
//!
//! A [`Scheduler`] owns a list of [`Trigger`]s, each a parsed cron
//! [`Schedule`] plus a job. Once started, every trigger runs its own loop:
//! sleep until the next fire time, spawn the job, repeat. Jobs are spawned so
//! a slow firing never delays the next one; firings of the same trigger may
//! overlap.
//!
//! Triggers may be added after the scheduler started; they begin firing
//! immediately. The trigger list only ever grows. [`Scheduler::shutdown`]
//! stops every loop.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// The payload of a task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Name of the firing task.
    pub task: String,
    /// The fire time computed from the schedule.
    pub scheduled_at: DateTime<Utc>,
    /// When the job was actually started.
    pub fired_at: DateTime<Utc>,
}

/// Parses a cron expression.
///
/// Accepts five fields (`min hour dom month dow`, fires at second 0), six
/// fields (leading seconds), seven fields (trailing year), and shorthands
/// such as `@hourly` or `@daily`.
pub fn parse_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {expression}"))
    } else {
        Schedule::from_str(expression)
    }
}

/// The work run on every firing.
pub type Job = Arc<dyn Fn(Tick) -> BoxFuture<'static, ()> + Send + Sync>;

/// A schedule bound to a job.
pub struct Trigger {
    name: String,
    schedule: Schedule,
    job: Job,
}

impl Trigger {
    pub fn new(name: impl Into<String>, schedule: Schedule, job: Job) -> Self {
        Self {
            name: name.into(),
            schedule,
            job,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the next fire time strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("schedule", &self.schedule.to_string())
            .finish()
    }
}

/// Runs triggers on their schedules.
#[derive(Default)]
pub struct Scheduler {
    triggers: Mutex<Vec<Arc<Trigger>>>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a trigger. If the scheduler is running, the trigger starts
    /// firing right away.
    pub fn add(&self, trigger: Trigger) {
        let trigger = Arc::new(trigger);
        debug!(task = %trigger.name, "Added trigger");
        self.triggers.lock().push(trigger.clone());

        if self.is_running() {
            self.spawn_loop(trigger);
        }
    }

    /// Starts every trigger loop.
    ///
    /// Returns `false` if the scheduler was already started.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already started");
            return false;
        }

        let triggers = self.triggers.lock().clone();
        info!(triggers = triggers.len(), "Scheduler started");
        for trigger in triggers {
            self.spawn_loop(trigger);
        }
        true
    }

    /// Stops every trigger loop. Jobs already running are not interrupted.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Scheduler shutting down");
            self.shutdown.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.lock().len()
    }

    /// Whether a trigger with this name was added.
    pub fn has_trigger(&self, name: &str) -> bool {
        self.triggers.lock().iter().any(|t| t.name == name)
    }

    pub fn trigger_names(&self) -> Vec<String> {
        self.triggers
            .lock()
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    fn spawn_loop(&self, trigger: Arc<Trigger>) {
        tokio::spawn(run_trigger(trigger, self.shutdown.clone()));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("triggers", &self.trigger_count())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_trigger(trigger: Arc<Trigger>, shutdown: CancellationToken) {
    let mut cursor = Utc::now();

    loop {
        let Some(next) = trigger.next_after(&cursor) else {
            debug!(task = %trigger.name, "Schedule has no upcoming fire times");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        trace!(task = %trigger.name, next = %next, "Waiting for next firing");

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(task = %trigger.name, "Trigger stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let tick = Tick {
            task: trigger.name.clone(),
            scheduled_at: next,
            fired_at: Utc::now(),
        };
        tokio::spawn((trigger.job)(tick));

        // Skip fire times missed while this loop was not polled.
        cursor = next.max(Utc::now());
    }
}
