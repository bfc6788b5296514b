//! In-memory stores for tests, with failure injection.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{AlertFilter, AlertStore, JobFilter, JobStore};
use crate::error::StoreError;
use crate::model::{Alert, Job};

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<Vec<Job>>,
    alerts: Mutex<Vec<Alert>>,
    fail_job_lists: AtomicBool,
    fail_alert_lists: AtomicBool,
    fail_writes: AtomicBool,
    job_lists: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following job `list` call fail until reset.
    pub fn fail_job_lists(&self, fail: bool) {
        self.fail_job_lists.store(fail, Ordering::SeqCst);
    }

    pub fn fail_alert_lists(&self, fail: bool) {
        self.fail_alert_lists.store(fail, Ordering::SeqCst);
    }

    /// Makes create, update and delete fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn job_list_calls(&self) -> usize {
        self.job_lists.load(Ordering::SeqCst)
    }
}

fn check_failure(flag: &AtomicBool) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Decode("store unavailable".to_string()));
    }
    Ok(())
}

fn alert_matches(filter: &AlertFilter, alert: &Alert) -> bool {
    filter.migration_from.map_or(true, |from| alert.migration_date >= from)
        && filter.migration_until.map_or(true, |until| alert.migration_date < until)
        && (!filter.ready_only || alert.is_ready_to_send.is_ready())
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        self.job_lists.fetch_add(1, Ordering::SeqCst);
        check_failure(&self.fail_job_lists)?;
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| filter.added_by.as_ref().map_or(true, |a| &j.added_by == a))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        check_failure(&self.fail_writes)?;
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<u64, StoreError> {
        check_failure(&self.fail_writes)?;
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        check_failure(&self.fail_writes)?;
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok((before - jobs.len()) as u64)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        check_failure(&self.fail_alert_lists)?;
        let alerts = self.alerts.lock().unwrap();
        Ok(alerts
            .iter()
            .filter(|a| alert_matches(filter, a))
            .cloned()
            .collect())
    }

    async fn get(&self, migration_id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.migration_id == migration_id)
            .cloned())
    }

    async fn create(&self, alert: &Alert) -> Result<(), StoreError> {
        check_failure(&self.fail_writes)?;
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn update(&self, alert: &Alert) -> Result<u64, StoreError> {
        check_failure(&self.fail_writes)?;
        let mut alerts = self.alerts.lock().unwrap();
        match alerts
            .iter_mut()
            .find(|a| a.migration_id == alert.migration_id)
        {
            Some(stored) => {
                *stored = alert.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, migration_id: &str) -> Result<u64, StoreError> {
        check_failure(&self.fail_writes)?;
        let mut alerts = self.alerts.lock().unwrap();
        let before = alerts.len();
        alerts.retain(|a| a.migration_id != migration_id);
        Ok((before - alerts.len()) as u64)
    }
}
