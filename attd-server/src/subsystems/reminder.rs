//! Countdown notifications for a tracked session
//!
//! Two halves:
//! - [`ReminderPlan::compute`] is a pure function of a session's start and end that
//!   lists every (instant, message) pair to show.
//! - [`ReminderTask::run`] wakes on a fixed period and shows the plan entries whose
//!   instant has passed, until the session's end.
//!
//! Reminder rules, where `remaining` is the whole minutes left at each minute
//! boundary counted from the session's start:
//! - `remaining > 10` and a multiple of 20 → "You have N minutes left!"
//! - `remaining == 10` → "Just 10 minutes left!"
//! - `remaining == 5` → "The last 5 minutes!"
//! - at the end → "You did it!"

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use attd_core::config::{OverlapPolicy, ReminderConfig};
use attd_core::{Notifier, SessionTimes};

use super::registry::TrackerRegistry;

pub const TERMINAL_MESSAGE: &str = "You did it!";

/// Countdown reminders are only planned for the final day of a session.
pub const MAX_COUNTDOWN_MINUTES: i64 = 24 * 60;

// ============================================================================
// PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub fire_at: DateTime<Utc>,
    pub message: String,
}

/// Ordered reminders for one session. The last entry is always the terminal
/// notice at the session's end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPlan {
    entries: Vec<Reminder>,
    end_time: DateTime<Utc>,
}

impl ReminderPlan {
    pub fn compute(start: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let span = end_time - start;
        let whole_minutes = span.num_minutes();
        // Sub-minute part of the span; countdown instants stay on the start's minute grid
        let offset = span - ChronoDuration::minutes(whole_minutes);

        let countdown = if whole_minutes > MAX_COUNTDOWN_MINUTES {
            tracing::warn!(
                %start,
                %end_time,
                minutes = whole_minutes,
                "Session longer than the countdown window; early reminders dropped"
            );
            MAX_COUNTDOWN_MINUTES
        } else {
            whole_minutes
        };

        let mut entries: Vec<Reminder> = countdown_minutes(countdown)
            .map(|remaining| Reminder {
                fire_at: end_time - offset - ChronoDuration::minutes(remaining),
                message: reminder_message(remaining),
            })
            .collect();

        entries.push(Reminder {
            fire_at: end_time,
            message: TERMINAL_MESSAGE.to_string(),
        });

        Self { entries, end_time }
    }

    pub fn from_times(times: &SessionTimes) -> Self {
        Self::compute(times.created_at, times.end_time)
    }

    pub fn entries(&self) -> &[Reminder] {
        &self.entries
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }
}

/// Remaining-minute values that get a reminder, largest first, for a session with
/// `total` whole minutes left at its start.
fn countdown_minutes(total: i64) -> impl Iterator<Item = i64> {
    let top_twenty = if total >= 20 { total - total % 20 } else { 0 };
    let twenties = (1..=top_twenty / 20).rev().map(|n| n * 20);
    let finals = [10, 5].into_iter().filter(move |m| *m <= total);
    twenties.chain(finals)
}

fn reminder_message(remaining: i64) -> String {
    match remaining {
        10 => "Just 10 minutes left!".to_string(),
        5 => "The last 5 minutes!".to_string(),
        r => format!("You have {} minutes left!", r),
    }
}

// ============================================================================
// EXECUTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    Completed { fired: usize },
    Cancelled { fired: usize },
}

/// One background unit that shows a single plan's reminders.
pub struct ReminderTask {
    plan: ReminderPlan,
    notifier: Notifier,
    tick: Duration,
    cancel: CancellationToken,
}

impl ReminderTask {
    pub fn new(
        plan: ReminderPlan,
        notifier: Notifier,
        tick: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            plan,
            notifier,
            tick,
            cancel,
        }
    }

    /// Run until the session ends or the task is cancelled.
    ///
    /// `started_at` is the wall-clock instant matching the task's first wake. Plan
    /// instants are mapped onto the monotonic clock once, here. Entries that were
    /// already more than one period old at that point are dropped, except the
    /// terminal notice.
    pub async fn run(self, started_at: DateTime<Utc>) -> ReminderOutcome {
        let origin = Instant::now();
        let at = |t: DateTime<Utc>| match (t - started_at).to_std() {
            Ok(offset) => origin + offset,
            Err(_) => origin,
        };

        let stale_before = started_at
            - ChronoDuration::from_std(self.tick).unwrap_or_else(|_| ChronoDuration::zero());
        let last = self.plan.entries.len().saturating_sub(1);
        let mut pending: VecDeque<(Instant, &Reminder)> = self
            .plan
            .entries
            .iter()
            .enumerate()
            .filter(|(i, r)| *i == last || r.fire_at >= stale_before)
            .map(|(_, r)| (at(r.fire_at), r))
            .collect();
        let end = at(self.plan.end_time);

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fired = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return ReminderOutcome::Cancelled { fired };
                }
                _ = ticker.tick() => {
                    let now = Instant::now();
                    while let Some((due, reminder)) = pending.front() {
                        if *due > now {
                            break;
                        }
                        self.notifier.notify(&reminder.message);
                        fired += 1;
                        pending.pop_front();
                    }
                    if now >= end {
                        return ReminderOutcome::Completed { fired };
                    }
                }
            }
        }
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Starts reminder tasks and keeps their cancellation handles in a registry keyed
/// by Slack identity.
#[derive(Clone)]
pub struct ReminderScheduler {
    registry: TrackerRegistry,
    notifier: Notifier,
    tick: Duration,
    overlap: OverlapPolicy,
}

impl ReminderScheduler {
    pub fn new(notifier: Notifier, config: &ReminderConfig) -> Self {
        Self {
            registry: TrackerRegistry::new(),
            notifier,
            tick: config.tick(),
            overlap: config.overlap,
        }
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    /// Start a detached reminder task for `identity`'s session. Returns its id.
    pub async fn schedule(&self, identity: &str, times: SessionTimes) -> Uuid {
        let plan = ReminderPlan::from_times(&times);
        let task_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        match self.overlap {
            OverlapPolicy::Additive => {
                self.registry
                    .register(identity, task_id, cancel.clone())
                    .await;
            }
            OverlapPolicy::Replace => {
                let replaced = self
                    .registry
                    .replace(identity, task_id, cancel.clone())
                    .await;
                if replaced > 0 {
                    tracing::info!(slack_id = %identity, replaced, "Replaced running reminder tasks");
                }
            }
        }

        tracing::info!(
            slack_id = %identity,
            task_id = %task_id,
            end_time = %times.end_time,
            reminders = plan.entries().len(),
            "Reminder task started"
        );

        let task = ReminderTask::new(plan, self.notifier.clone(), self.tick, cancel);
        let registry = self.registry.clone();
        let identity = identity.to_string();
        tokio::spawn(async move {
            let outcome = task.run(Utc::now()).await;
            registry.remove(&identity, task_id).await;
            let (fired, state) = match outcome {
                ReminderOutcome::Completed { fired } => (fired, "finished"),
                ReminderOutcome::Cancelled { fired } => (fired, "cancelled"),
            };
            tracing::info!(
                slack_id = %identity,
                task_id = %task_id,
                fired,
                "Reminder task {}",
                state
            );
        });

        task_id
    }

    /// Cancel every running task for `identity`.
    pub async fn cancel(&self, identity: &str) -> usize {
        self.registry.cancel(identity).await
    }

    /// Cancel everything; called on daemon shutdown.
    pub async fn shutdown(&self) -> usize {
        self.registry.cancel_all().await
    }
}

// ============================================================================
// TESTS
// ============================================================================
