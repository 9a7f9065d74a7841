//! In-memory registry of live jobs.
//!
//! An identity enters the registry when a submission is accepted for
//! processing and leaves it when the job's monitor has finished
//! finalization. While present, the identity cannot be submitted again.
//!
//! The whole map sits behind one [`std::sync::Mutex`]. No lock is ever held
//! across an `.await`, and [`Reservation`] must be able to release its slot
//! from `Drop`, so a blocking mutex is used rather than an async one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cam2_core::submission::SubmissionKey;
use tokio::sync::mpsc;

use crate::error::SupervisorError;
use crate::monitor::StopRequest;

/// A job whose backend process is owned by a running monitor task.
#[derive(Debug)]
pub struct LiveJob {
    pub key: SubmissionKey,
    /// OS process id of the backend, if known.
    pub pid: Option<u32>,
    /// Channel to the job's monitor task.
    pub(crate) control: mpsc::Sender<StopRequest>,
}

impl LiveJob {
    pub(crate) fn new(
        key: SubmissionKey,
        pid: Option<u32>,
        control: mpsc::Sender<StopRequest>,
    ) -> Self {
        Self { key, pid, control }
    }
}

#[derive(Debug)]
enum Slot {
    /// Identity claimed by an in-progress `submit`.
    Reserved,
    Live(Arc<LiveJob>),
}

/// Thread-safe map of live jobs keyed by `(owner, submission_id)`.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<SubmissionKey, Slot>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubmissionKey, Slot>> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock is still safe to use.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key` for a new job.
    ///
    /// Fails with [`SupervisorError::DuplicateSubmission`] if the identity is
    /// already reserved or live. The claim is released when the returned
    /// [`Reservation`] is dropped without being committed.
    pub fn add(&self, key: SubmissionKey) -> Result<Reservation<'_>, SupervisorError> {
        let mut jobs = self.lock();
        if jobs.contains_key(&key) {
            return Err(SupervisorError::DuplicateSubmission(key));
        }
        jobs.insert(key.clone(), Slot::Reserved);
        Ok(Reservation {
            registry: self,
            key,
            committed: false,
        })
    }

    /// Look up a live job. Reserved identities are not returned.
    pub fn find(&self, key: &SubmissionKey) -> Option<Arc<LiveJob>> {
        match self.lock().get(key) {
            Some(Slot::Live(job)) => Some(Arc::clone(job)),
            _ => None,
        }
    }

    /// Whether `key` is reserved or live.
    pub fn contains(&self, key: &SubmissionKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Remove a job. Returns `false` if it was not present.
    pub fn remove(&self, key: &SubmissionKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Number of reserved and live entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `owner` has any reserved or live job.
    pub fn has_owner(&self, owner: &str) -> bool {
        self.lock().keys().any(|key| key.owner == owner)
    }

    fn release(&self, key: &SubmissionKey) {
        let mut jobs = self.lock();
        if matches!(jobs.get(key), Some(Slot::Reserved)) {
            jobs.remove(key);
        }
    }
}

/// Pending claim on an identity, returned by [`JobRegistry::add`].
#[derive(Debug)]
#[must_use = "dropping a reservation releases the identity"]
pub struct Reservation<'a> {
    registry: &'a JobRegistry,
    key: SubmissionKey,
    committed: bool,
}

impl Reservation<'_> {
    pub fn key(&self) -> &SubmissionKey {
        &self.key
    }

    /// Turn the reservation into a live registry entry.
    pub fn commit(mut self, job: LiveJob) -> Arc<LiveJob> {
        let job = Arc::new(job);
        self.registry
            .lock()
            .insert(self.key.clone(), Slot::Live(Arc::clone(&job)));
        self.committed = true;
        job
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.release(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn key(id: &str) -> SubmissionKey {
        SubmissionKey::new("alice", id)
    }

    fn live(key: SubmissionKey) -> LiveJob {
        let (tx, _rx) = mpsc::channel(1);
        LiveJob::new(key, Some(42), tx)
    }

    // -----------------------------------------------------------------------
    // add / commit
    // -----------------------------------------------------------------------

    #[test]
    fn committed_job_is_found() {
        let registry = JobRegistry::new();
        let reservation = registry.add(key("1")).unwrap();
        assert!(registry.find(&key("1")).is_none(), "reserved is not live yet");

        reservation.commit(live(key("1")));
        let job = registry.find(&key("1")).expect("live job");
        assert_eq!(job.key, key("1"));
        assert_eq!(job.pid, Some(42));
        assert!(registry.has_owner("alice"));
    }

    #[test]
    fn duplicate_add_is_rejected_while_reserved_or_live() {
        let registry = JobRegistry::new();
        let reservation = registry.add(key("1")).unwrap();
        assert_matches!(
            registry.add(key("1")),
            Err(SupervisorError::DuplicateSubmission(k)) if k == key("1")
        );

        reservation.commit(live(key("1")));
        assert_matches!(
            registry.add(key("1")),
            Err(SupervisorError::DuplicateSubmission(_))
        );

        // Same id for another owner is a different identity.
        assert!(registry.add(SubmissionKey::new("bob", "1")).is_ok());
    }

    #[test]
    fn dropped_reservation_frees_identity() {
        let registry = JobRegistry::new();
        {
            let _reservation = registry.add(key("1")).unwrap();
            assert!(registry.contains(&key("1")));
        }
        assert!(!registry.contains(&key("1")));
        assert!(registry.add(key("1")).is_ok());
    }

    #[test]
    fn has_owner_counts_reserved_and_live_jobs() {
        let registry = JobRegistry::new();
        assert!(!registry.has_owner("alice"));

        let reservation = registry.add(key("1")).unwrap();
        assert!(registry.has_owner("alice"), "a reservation belongs to its owner");
        assert!(!registry.has_owner("bob"));

        reservation.commit(live(key("1")));
        assert!(registry.has_owner("alice"));

        registry.remove(&key("1"));
        assert!(!registry.has_owner("alice"));
    }

    // -----------------------------------------------------------------------
    // remove
    // -----------------------------------------------------------------------

    #[test]
    fn remove_is_idempotent() {
        let registry = JobRegistry::new();
        registry.add(key("1")).unwrap().commit(live(key("1")));

        assert!(registry.remove(&key("1")));
        assert!(!registry.remove(&key("1")));
        assert!(registry.is_empty());
        assert!(registry.add(key("1")).is_ok());
    }

    #[test]
    fn concurrent_adds_admit_exactly_one() {
        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || match registry.add(key("race")) {
                    Ok(reservation) => {
                        reservation.commit(live(key("race")));
                        true
                    }
                    Err(_) => false,
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }
}
