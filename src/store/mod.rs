#[cfg(test)]
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{Alert, Job};

pub use sqlite::LibsqlStore;

/// Selects jobs in `JobStore::list`. The default filter matches every job.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub added_by: Option<String>,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Selects alerts in `AlertStore::list`. The default filter matches every alert.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    /// Inclusive lower bound on the migration date
    pub migration_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the migration date
    pub migration_until: Option<DateTime<Utc>>,
    /// Only alerts explicitly marked ready to send
    pub ready_only: bool,
}

impl AlertFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn migrating_between(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            migration_from: Some(from),
            migration_until: Some(until),
            ready_only: false,
        }
    }

    pub fn ready_only(mut self, ready_only: bool) -> Self {
        self.ready_only = ready_only;
        self
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;
    async fn create(&self, job: &Job) -> Result<(), StoreError>;
    /// Returns the number of updated records.
    async fn update(&self, job: &Job) -> Result<u64, StoreError>;
    /// Returns the number of deleted records.
    async fn delete(&self, id: &str) -> Result<u64, StoreError>;
}

/// Alerts are addressed by their business key, the migration id.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError>;
    async fn get(&self, migration_id: &str) -> Result<Option<Alert>, StoreError>;
    async fn create(&self, alert: &Alert) -> Result<(), StoreError>;
    /// Returns the number of updated records.
    async fn update(&self, alert: &Alert) -> Result<u64, StoreError>;
    /// Returns the number of deleted records.
    async fn delete(&self, migration_id: &str) -> Result<u64, StoreError>;
}
