//! Keyed job-status store.
//!
//! The orchestrator is the single writer per job id; status pollers only
//! read. [`JobStore`] is the seam for swapping the in-process map for a
//! shared database in multi-process deployments.

use crate::error::Pdf2VideoError;
use crate::model::{Job, JobPatch, Page};
use std::collections::HashMap;
use std::sync::RwLock;

/// Create/read/update access to job and page records.
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the id is taken.
    fn insert(&self, job: Job) -> Result<(), Pdf2VideoError>;

    fn get(&self, job_id: &str) -> Option<Job>;

    /// Merge `patch` into the stored job atomically and return the result.
    fn upsert(&self, job_id: &str, patch: JobPatch) -> Result<Job, Pdf2VideoError>;

    /// Replace the page records of a job.
    fn save_pages(&self, job_id: &str, pages: &[Page]) -> Result<(), Pdf2VideoError>;

    fn pages(&self, job_id: &str) -> Option<Vec<Page>>;
}

#[derive(Default)]
struct Records {
    jobs: HashMap<String, Job>,
    pages: HashMap<String, Vec<Page>>,
}

/// [`JobStore`] backed by a process-local map.
#[derive(Default)]
pub struct InMemoryJobStore {
    records: RwLock<Records>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs, most recently created first.
    pub fn list(&self) -> Vec<Job> {
        let Ok(records) = self.records.read() else {
            return Vec::new();
        };
        let mut jobs: Vec<Job> = records.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

fn poisoned() -> Pdf2VideoError {
    Pdf2VideoError::Internal("job store lock poisoned".into())
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), Pdf2VideoError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.jobs.contains_key(&job.id) {
            return Err(Pdf2VideoError::JobAlreadyExists { job_id: job.id });
        }
        records.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, job_id: &str) -> Option<Job> {
        self.records.read().ok()?.jobs.get(job_id).cloned()
    }

    fn upsert(&self, job_id: &str, patch: JobPatch) -> Result<Job, Pdf2VideoError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let job = records
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Pdf2VideoError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        job.apply(patch)?;
        Ok(job.clone())
    }

    fn save_pages(&self, job_id: &str, pages: &[Page]) -> Result<(), Pdf2VideoError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if !records.jobs.contains_key(job_id) {
            return Err(Pdf2VideoError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }
        records.pages.insert(job_id.to_string(), pages.to_vec());
        Ok(())
    }

    fn pages(&self, job_id: &str) -> Option<Vec<Page>> {
        self.records.read().ok()?.pages.get(job_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;
    use std::sync::Arc;

    #[test]
    fn insert_then_get() {
        let store = InMemoryJobStore::new();
        store.insert(Job::queued("a")).unwrap();
        let job = store.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = InMemoryJobStore::new();
        store.insert(Job::queued("a")).unwrap();
        let err = store.insert(Job::queued("a")).unwrap_err();
        assert!(matches!(err, Pdf2VideoError::JobAlreadyExists { .. }));
    }

    #[test]
    fn upsert_merges_patch() {
        let store = InMemoryJobStore::new();
        store.insert(Job::queued("a")).unwrap();
        let job = store
            .upsert("a", JobPatch::stage(JobStatus::Extracting))
            .unwrap();
        assert_eq!(job.status, JobStatus::Extracting);
        assert_eq!(store.get("a").unwrap().progress, 10.0);
    }

    #[test]
    fn upsert_unknown_job_fails() {
        let store = InMemoryJobStore::new();
        let err = store
            .upsert("nope", JobPatch::stage(JobStatus::Extracting))
            .unwrap_err();
        assert!(matches!(err, Pdf2VideoError::JobNotFound { .. }));
    }

    #[test]
    fn invalid_transition_leaves_job_untouched() {
        let store = InMemoryJobStore::new();
        store.insert(Job::queued("a")).unwrap();
        assert!(store
            .upsert("a", JobPatch::stage(JobStatus::Completed))
            .is_err());
        assert_eq!(store.get("a").unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn pages_round_trip() {
        let store = InMemoryJobStore::new();
        store.insert(Job::queued("a")).unwrap();
        store
            .save_pages("a", &[Page::new(1, "one"), Page::new(2, "two")])
            .unwrap();
        let pages = store.pages("a").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].text, "two");
        assert!(store.save_pages("missing", &[]).is_err());
    }

    #[test]
    fn concurrent_writers_on_distinct_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("job-{i}");
                    store.insert(Job::queued(id.clone())).unwrap();
                    for status in JobStatus::PIPELINE.iter().skip(1) {
                        store.upsert(&id, JobPatch::stage(*status)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let jobs = store.list();
        assert_eq!(jobs.len(), 8);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    }
}
