//! Job records: the recurring mail schedules. Changes reach the live
//! schedule at the next refresh.

use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::cron::Schedule;
use crate::error::{ServiceError, ServiceResult};
use crate::model::{Job, JobUpdate, NewJob};
use crate::store::{JobFilter, JobStore};

pub struct JobService {
    store: Arc<dyn JobStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewJob) -> ServiceResult<Job> {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            cron_expression: new.cron_expression.trim().to_string(),
            start_offset_days: new.start_offset_days,
            end_offset_days: new.end_offset_days,
            template_name: new.template_name,
            mail_subject: new.mail_subject,
            comments: new.comments,
            created_at: Utc::now(),
            added_by: new.added_by,
        };
        validate(&job)?;

        self.store.create(&job).await?;
        info!("Created job '{}' on '{}'", job.id, job.cron_expression);
        Ok(job)
    }

    pub async fn get(&self, id: &str) -> ServiceResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn list(&self, filter: &JobFilter) -> ServiceResult<Vec<Job>> {
        Ok(self.store.list(filter).await?)
    }

    pub async fn update(&self, id: &str, update: JobUpdate) -> ServiceResult<Job> {
        let mut job = self.get(id).await?;
        update.apply(&mut job);
        job.cron_expression = job.cron_expression.trim().to_string();
        validate(&job)?;

        if self.store.update(&job).await? == 0 {
            return Err(not_found(id));
        }
        info!("Updated job '{}'", id);
        Ok(job)
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        if self.store.delete(id).await? == 0 {
            return Err(not_found(id));
        }
        info!("Deleted job '{}'", id);
        Ok(())
    }
}

fn validate(job: &Job) -> ServiceResult<()> {
    if let Err(e) = Schedule::parse(&job.cron_expression) {
        return Err(ServiceError::Validation(format!("{:#}", e)));
    }
    if job.start_offset_days >= job.end_offset_days {
        return Err(ServiceError::Validation(format!(
            "startOffsetDays ({}) must be lower than endOffsetDays ({})",
            job.start_offset_days, job.end_offset_days
        )));
    }
    if job.mail_subject.trim().is_empty() {
        return Err(ServiceError::Validation(
            "mailSubject must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn not_found(id: &str) -> ServiceError {
    ServiceError::NotFound(format!("job '{}'", id))
}
