//! Trigger scheduling: the [`Scheduler`] seam and its cron-backed implementation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

/// Invoked once per trigger instant.
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Opaque token identifying one registration; needed to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(Uuid);

impl JobHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fires callbacks at the instants described by cron expressions.
pub trait Scheduler: Send + Sync {
    fn register(&self, expression: &str, callback: JobCallback) -> Result<JobHandle>;

    /// Stop firing `handle`. Unknown handles are ignored.
    fn cancel(&self, handle: JobHandle);
}

/// Tokio-driven cron scheduler.
///
/// Each registration owns a task that sleeps until the next instant and then
/// spawns the callback on its own task, so a long-running callback never
/// delays the trigger clock. Spawned callbacks are tracked so shutdown can
/// wait for them.
pub struct CronScheduler {
    jobs: DashMap<JobHandle, CancellationToken>,
    shutdown: CancellationToken,
    running: TaskTracker,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            shutdown: CancellationToken::new(),
            running: TaskTracker::new(),
        }
    }

    /// Number of active registrations.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Stop firing every trigger and wait up to `grace` for callbacks that
    /// are already running. Returns `false` if the deadline expired first.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(registrations = self.jobs.len(), "scheduler shutting down");
        self.shutdown.cancel();
        self.jobs.clear();
        self.running.close();

        let finished = tokio::time::timeout(grace, self.running.wait()).await.is_ok();
        if !finished {
            warn!(
                still_running = self.running.len(),
                grace_secs = grace.as_secs(),
                "shutdown grace period expired with executions still running"
            );
        }
        finished
    }
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for CronScheduler {
    fn register(&self, expression: &str, callback: JobCallback) -> Result<JobHandle> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }
        let schedule = parse_schedule(expression)?;

        let handle = JobHandle::new();
        let token = self.shutdown.child_token();
        self.jobs.insert(handle, token.clone());
        tokio::spawn(trigger_loop(schedule, callback, token, self.running.clone()));

        debug!(%handle, %expression, "trigger registered");
        Ok(handle)
    }

    fn cancel(&self, handle: JobHandle) {
        if let Some((_, token)) = self.jobs.remove(&handle) {
            token.cancel();
            debug!(%handle, "trigger cancelled");
        }
    }
}

async fn trigger_loop(
    schedule: Schedule,
    callback: JobCallback,
    token: CancellationToken,
    running: TaskTracker,
) {
    let mut after = Utc::now();
    loop {
        let Some(next) = schedule.after(&after).next() else {
            debug!("schedule has no further instants");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        running.spawn(callback());
        // Skip instants missed while the host was suspended instead of bursting.
        after = next.max(Utc::now());
    }
}

/// Parse a cron expression after [`normalize_expression`].
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let normalized = normalize_expression(expression);
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Accept the classic 5-field crontab syntax alongside the seconds-first
/// 6/7-field syntax and `@hourly`-style descriptors.
///
/// A 5-field expression gets a `0` seconds field, and its numeric
/// day-of-week values (0-7, Sunday = 0 or 7) are shifted to the 1-7,
/// Sunday = 1 numbering used by the parser.
pub fn normalize_expression(expression: &str) -> String {
    let expression = expression.trim();
    if expression.starts_with('@') {
        return expression.to_string();
    }

    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, dom, month, dow] => format!(
            "0 {minute} {hour} {dom} {month} {}",
            shift_day_of_week(dow)
        ),
        _ => expression.to_string(),
    }
}

fn shift_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(shift_day_of_week_item)
        .collect::<Vec<_>>()
        .join(",")
}

fn shift_day_of_week_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((r, s)) => (r, Some(s)),
        None => (item, None),
    };
    let suffix = step.map(|s| format!("/{s}")).unwrap_or_default();

    if range == "*" || range == "?" {
        return item.to_string();
    }

    match range.split_once('-') {
        Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
            (Ok(0), Ok(7)) => format!("1-7{suffix}"),
            // Sunday as 7 closes the week and wraps to the parser's 1.
            (Ok(start), Ok(7)) if step.is_none() && start <= 6 => {
                format!("{}-7,1", start + 1)
            }
            (Ok(start), Ok(end)) if start <= 6 && end <= 6 => {
                format!("{}-{}{suffix}", start + 1, end + 1)
            }
            _ => item.to_string(),
        },
        None => match range.parse::<u32>() {
            Ok(day) if day <= 7 => format!("{}{suffix}", day % 7 + 1),
            _ => item.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn five_field_expressions_gain_seconds() {
        assert_eq!(normalize_expression("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_expression(" 0 9 * * 1-5 "), "0 0 9 * * 2-6");
        assert_eq!(normalize_expression("30 2 * * 0"), "0 30 2 * * 1");
        assert_eq!(normalize_expression("0 0 * * 7"), "0 0 0 * * 1");
        assert_eq!(normalize_expression("0 0 * * 5-7"), "0 0 0 * * 6-7,1");
        assert_eq!(normalize_expression("0 0 * * 0,3"), "0 0 0 * * 1,4");
        assert_eq!(normalize_expression("0 0 * * MON-FRI"), "0 0 0 * * MON-FRI");
    }

    #[test]
    fn other_forms_pass_through() {
        assert_eq!(normalize_expression("@hourly"), "@hourly");
        assert_eq!(normalize_expression("*/10 * * * * *"), "*/10 * * * * *");
    }

    #[test]
    fn weekday_schedule_fires_on_monday() {
        // 2024-01-07 is a Sunday.
        let sunday = Utc.with_ymd_and_hms(2024, 1, 7, 12, 0, 0).unwrap();
        let schedule = parse_schedule("0 9 * * 1-5").unwrap();
        let next = schedule.after(&sunday).next().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let err = parse_schedule("every tuesday").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
    }

    fn counting_callback(counter: Arc<AtomicUsize>) -> JobCallback {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn fires_until_cancelled() {
        let scheduler = CronScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = scheduler
            .register("* * * * * *", counting_callback(fired.clone()))
            .unwrap();
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(fired.load(Ordering::SeqCst) >= 1);

        scheduler.cancel(handle);
        assert!(scheduler.is_empty());
        let after_cancel = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn cancel_unknown_handle_is_noop() {
        let scheduler = CronScheduler::new();
        scheduler.cancel(JobHandle::new());
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn shutdown_waits_for_running_callbacks() {
        let scheduler = CronScheduler::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let done = finished.clone();
        let slow: JobCallback = Arc::new(move || {
            let done = done.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
        });
        scheduler.register("* * * * * *", slow).unwrap();

        // Let at least one trigger fire.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(scheduler.shutdown(Duration::from_secs(5)).await);
        assert!(finished.load(Ordering::SeqCst) >= 1);

        let err = scheduler
            .register("* * * * * *", counting_callback(Arc::new(AtomicUsize::new(0))))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ShuttingDown));
    }
}
