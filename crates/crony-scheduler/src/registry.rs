use std::sync::Arc;

use crony_core::{Workload, WorkloadId};
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::executor::Job;
use crate::guard::ConcurrencyGuard;
use crate::trigger::{JobCallback, JobHandle, Scheduler};

/// One registered workload and the trigger firing it.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub workload: Arc<Workload>,
    pub handle: JobHandle,
    pub guard: ConcurrencyGuard,
}

/// Live mapping from workload identity to its scheduled trigger.
///
/// Operations on the same identity are serialized by the map's shard lock,
/// which is held across the scheduler call: the first add wins, and a
/// remove observed after it always cancels the trigger it created.
pub struct JobRegistry {
    entries: DashMap<WorkloadId, RegistryEntry>,
    scheduler: Arc<dyn Scheduler>,
    job: Arc<dyn Job>,
}

impl JobRegistry {
    pub fn new(scheduler: Arc<dyn Scheduler>, job: Arc<dyn Job>) -> Self {
        Self {
            entries: DashMap::new(),
            scheduler,
            job,
        }
    }

    /// Register a trigger for `workload` unless one already exists.
    ///
    /// Returns `true` if a new trigger was registered.
    pub fn add(&self, workload: Workload) -> Result<bool> {
        let slot = match self.entries.entry(workload.id.clone()) {
            Entry::Occupied(_) => {
                debug!(workload = %workload.name, "already registered");
                return Ok(false);
            }
            Entry::Vacant(slot) => slot,
        };

        let workload = Arc::new(workload);
        let guard = ConcurrencyGuard::new(workload.name.clone());
        let callback = guarded_callback(self.job.clone(), workload.clone(), guard.clone());
        let handle = self.scheduler.register(&workload.schedule, callback)?;

        info!(
            workload = %workload.name,
            schedule = %workload.schedule,
            policy = %workload.policy,
            "job registered"
        );
        slot.insert(RegistryEntry {
            workload,
            handle,
            guard,
        });
        Ok(true)
    }

    /// Cancel and forget the trigger for `id`. Unknown ids are ignored.
    ///
    /// Returns `true` if an entry was removed. An execution already in flight
    /// is left to finish.
    pub fn remove(&self, id: &WorkloadId) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                self.scheduler.cancel(entry.handle);
                info!(workload = %entry.workload.name, "job removed");
                true
            }
            None => {
                debug!(%id, "remove for unknown workload ignored");
                false
            }
        }
    }

    /// Add every workload in `workloads`; returns how many were new.
    ///
    /// Workloads that can't be scheduled are logged and skipped.
    pub fn sync(&self, workloads: Vec<Workload>) -> usize {
        let mut added = 0;
        for workload in workloads {
            let name = workload.name.clone();
            match self.add(workload) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => error!(workload = %name, error = %e, "can't register job"),
            }
        }
        added
    }

    /// Remove entries for `scanned` ids that are no longer in `current`.
    ///
    /// Closes the gap between an inventory scan and the event subscription
    /// catching up: a workload destroyed in between is dropped here even if
    /// its destroy event was never observed. Identities are never reused, so
    /// an id missing from `current` can't belong to a newer workload.
    /// Returns how many entries were removed.
    pub fn forget_missing(&self, scanned: &[WorkloadId], current: &[Workload]) -> usize {
        scanned
            .iter()
            .filter(|id| !current.iter().any(|w| &w.id == *id))
            .filter(|id| self.remove(id))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &WorkloadId) -> bool {
        self.entries.contains_key(id)
    }

    /// Whether an execution for `id` is currently in flight.
    pub fn is_running(&self, id: &WorkloadId) -> bool {
        self.entries
            .get(id)
            .map(|entry| entry.guard.is_running())
            .unwrap_or(false)
    }
}

fn guarded_callback(
    job: Arc<dyn Job>,
    workload: Arc<Workload>,
    guard: ConcurrencyGuard,
) -> JobCallback {
    Arc::new(move || {
        let job = job.clone();
        let workload = workload.clone();
        let guard = guard.clone();
        Box::pin(async move {
            guard.run(job.execute(&workload)).await;
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use async_trait::async_trait;
    use crony_core::NotificationPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records registrations instead of firing them.
    #[derive(Default)]
    struct ManualScheduler {
        registered: Mutex<Vec<(JobHandle, JobCallback)>>,
        cancelled: Mutex<Vec<JobHandle>>,
    }

    impl ManualScheduler {
        fn callback(&self, i: usize) -> JobCallback {
            self.registered.lock().unwrap()[i].1.clone()
        }
    }

    impl Scheduler for ManualScheduler {
        fn register(&self, expression: &str, callback: JobCallback) -> Result<JobHandle> {
            if expression == "bad" {
                return Err(SchedulerError::InvalidSchedule {
                    expression: expression.to_string(),
                    reason: "unparseable".into(),
                });
            }
            let handle = JobHandle::new();
            self.registered.lock().unwrap().push((handle, callback));
            Ok(handle)
        }

        fn cancel(&self, handle: JobHandle) {
            self.cancelled.lock().unwrap().push(handle);
        }
    }

    #[derive(Default)]
    struct SlowJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Job for SlowJob {
        async fn execute(&self, _workload: &Workload) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn workload(id: &str, schedule: &str) -> Workload {
        Workload {
            id: WorkloadId::from(id),
            name: format!("job-{id}"),
            schedule: schedule.into(),
            policy: NotificationPolicy::Never,
            heartbeat_id: None,
        }
    }

    fn registry() -> (Arc<ManualScheduler>, Arc<SlowJob>, JobRegistry) {
        let scheduler = Arc::new(ManualScheduler::default());
        let job = Arc::new(SlowJob::default());
        let registry = JobRegistry::new(scheduler.clone(), job.clone());
        (scheduler, job, registry)
    }

    #[test]
    fn add_is_idempotent() {
        let (scheduler, _, registry) = registry();
        assert!(registry.add(workload("a", "* * * * *")).unwrap());
        assert!(!registry.add(workload("a", "* * * * *")).unwrap());

        assert_eq!(registry.len(), 1);
        assert_eq!(scheduler.registered.lock().unwrap().len(), 1);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let (scheduler, _, registry) = registry();
        assert!(!registry.remove(&WorkloadId::from("ghost")));
        assert!(scheduler.cancelled.lock().unwrap().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_cancels_the_trigger() {
        let (scheduler, _, registry) = registry();
        registry.add(workload("a", "* * * * *")).unwrap();
        let handle = scheduler.registered.lock().unwrap()[0].0;

        assert!(registry.remove(&WorkloadId::from("a")));
        assert!(!registry.contains(&WorkloadId::from("a")));
        assert_eq!(*scheduler.cancelled.lock().unwrap(), vec![handle]);

        // Re-adding after removal registers a fresh trigger.
        assert!(registry.add(workload("a", "* * * * *")).unwrap());
        assert_eq!(scheduler.registered.lock().unwrap().len(), 2);
    }

    #[test]
    fn sync_skips_invalid_schedules() {
        let (_, _, registry) = registry();
        registry.add(workload("a", "* * * * *")).unwrap();

        let added = registry.sync(vec![
            workload("a", "* * * * *"),
            workload("b", "0 3 * * *"),
            workload("c", "bad"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(&WorkloadId::from("c")));
    }

    #[tokio::test]
    async fn overlapping_triggers_run_once() {
        let (scheduler, job, registry) = registry();
        registry.add(workload("a", "* * * * *")).unwrap();
        let fire = scheduler.callback(0);

        tokio::join!(fire(), fire());
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert!(!registry.is_running(&WorkloadId::from("a")));

        fire().await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_register_once() {
        let (scheduler, _, registry) = registry();
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.add(workload("a", "* * * * *")).unwrap() })
            })
            .collect();
        let mut won = 0;
        for task in tasks {
            if task.await.unwrap() {
                won += 1;
            }
        }

        assert_eq!(won, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(scheduler.registered.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interleaved_add_remove_leaves_no_orphan_trigger() {
        let (scheduler, _, registry) = registry();
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        registry.add(workload("a", "* * * * *")).unwrap();
                    } else {
                        registry.remove(&WorkloadId::from("a"));
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let registered: HashSet<_> = scheduler
            .registered
            .lock()
            .unwrap()
            .iter()
            .map(|(handle, _)| *handle)
            .collect();
        let cancelled = scheduler.cancelled.lock().unwrap().clone();
        let unique: HashSet<_> = cancelled.iter().copied().collect();

        assert_eq!(unique.len(), cancelled.len());
        assert!(unique.is_subset(&registered));
        assert_eq!(registered.len() - cancelled.len(), registry.len());
        assert!(registry.len() <= 1);
    }

    #[test]
    fn forget_missing_drops_workloads_gone_since_the_scan() {
        let (scheduler, _, registry) = registry();
        let scanned = vec![workload("a", "* * * * *"), workload("b", "* * * * *")];
        let ids: Vec<_> = scanned.iter().map(|w| w.id.clone()).collect();
        registry.sync(scanned);
        // Registered by an event after the scan; not ours to judge.
        registry.add(workload("c", "* * * * *")).unwrap();

        let removed = registry.forget_missing(&ids, &[workload("b", "* * * * *")]);

        assert_eq!(removed, 1);
        assert!(!registry.contains(&WorkloadId::from("a")));
        assert!(registry.contains(&WorkloadId::from("b")));
        assert!(registry.contains(&WorkloadId::from("c")));
        assert_eq!(scheduler.cancelled.lock().unwrap().len(), 1);
    }

    #[test]
    fn forget_missing_ignores_ids_already_removed() {
        let (scheduler, _, registry) = registry();
        registry.add(workload("a", "* * * * *")).unwrap();
        registry.remove(&WorkloadId::from("a"));

        assert_eq!(registry.forget_missing(&[WorkloadId::from("a")], &[]), 0);
        assert_eq!(scheduler.cancelled.lock().unwrap().len(), 1);
    }
}
