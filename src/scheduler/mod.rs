//! Schedule engine: keeps one recurring trigger per stored job, rebuilt on a
//! fixed refresh cadence, and fans out alert notifications when a job fires.

pub mod registry;

use anyhow::Context;
use chrono::Utc;
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use crate::dispatcher::Outbox;
use crate::error::StoreError;
use crate::model::{Job, OutboundMessage};
use crate::store::{AlertFilter, AlertStore, JobFilter, JobStore};
use crate::utils::{day_start, format_duration};

use self::registry::{action, CronRegistry, EntryInfo};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub from_address: String,
    pub timezone: Tz,
    /// Only alerts explicitly marked ready are mailed.
    pub require_ready_to_send: bool,
}

/// The live projection of the job table. Replaced as a whole on refresh.
struct ScheduleState {
    jobs: BTreeMap<String, Job>,
    registry: Arc<CronRegistry>,
}

struct EngineInner {
    jobs: Arc<dyn JobStore>,
    alerts: Arc<dyn AlertStore>,
    outbox: Outbox,
    settings: EngineSettings,
    state: Mutex<Option<ScheduleState>>,
    refresher: Mutex<Option<Arc<CronRegistry>>>,
}

pub struct ScheduleEngine {
    inner: Arc<EngineInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScheduleEngine {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        alerts: Arc<dyn AlertStore>,
        outbox: Outbox,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                jobs,
                alerts,
                outbox,
                settings,
                state: Mutex::new(None),
                refresher: Mutex::new(None),
            }),
        }
    }

    /// Loads the job schedules once, then keeps reloading them on
    /// `refresh_spec`. A failed first load is retried at the next cycle.
    pub async fn start(&self, refresh_spec: &str) -> anyhow::Result<()> {
        let refresher = Arc::new(CronRegistry::new(self.inner.settings.timezone));
        let weak = Arc::downgrade(&self.inner);
        refresher
            .add(
                refresh_spec,
                action(move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(inner) = weak.upgrade() {
                            if let Err(e) = inner.refresh().await {
                                error!("Schedule refresh failed, keeping current schedule: {}", e);
                            }
                        }
                    }
                }),
            )
            .with_context(|| format!("Invalid job refresh schedule '{}'", refresh_spec))?;

        if let Err(e) = self.inner.refresh().await {
            error!("Initial schedule load failed, retrying at next refresh: {}", e);
        }

        refresher.start();
        if let Some(previous) = lock(&self.inner.refresher).replace(refresher) {
            previous.stop();
        }
        info!("Schedule engine started, refreshing on '{}'", refresh_spec);
        Ok(())
    }

    /// Rebuilds the live schedule from the job store. Returns the number of
    /// armed jobs. On failure the previous schedule stays armed.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        self.inner.refresh().await
    }

    /// Selects the alerts in the job's window and queues one message per
    /// alert. Returns how many messages were queued.
    pub async fn on_job_fire(&self, job: &Job) -> usize {
        self.inner.on_job_fire(job).await
    }

    /// Jobs backing the live schedule, ordered by id.
    pub fn scheduled_jobs(&self) -> Vec<Job> {
        lock(&self.inner.state)
            .as_ref()
            .map(|state| state.jobs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn armed_schedules(&self) -> Vec<EntryInfo> {
        lock(&self.inner.state)
            .as_ref()
            .map(|state| state.registry.entries())
            .unwrap_or_default()
    }

    /// Stops the refresh trigger and every job trigger, waiting for firings
    /// already in progress.
    pub async fn shutdown(&self) {
        let refresher = lock(&self.inner.refresher).take();
        if let Some(refresher) = refresher {
            refresher.drain().await;
        }

        let state = lock(&self.inner.state).take();
        if let Some(state) = state {
            state.registry.drain().await;
            state.registry.clear();
        }
        info!("Schedule engine stopped");
    }
}

impl EngineInner {
    async fn refresh(self: &Arc<Self>) -> Result<usize, StoreError> {
        let start = Instant::now();
        debug!("Refreshing job schedules");

        let jobs = self.jobs.list(&JobFilter::all()).await?;

        let registry = Arc::new(CronRegistry::new(self.settings.timezone));
        let mut mapping = BTreeMap::new();
        for job in jobs {
            let weak: Weak<EngineInner> = Arc::downgrade(self);
            let fired = job.clone();
            let armed = registry.add(
                &job.cron_expression,
                action(move || {
                    let weak = weak.clone();
                    let job = fired.clone();
                    async move {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_job_fire(&job).await;
                        }
                    }
                }),
            );

            match armed {
                Ok(_) => {
                    mapping.insert(job.id.clone(), job);
                }
                Err(e) => error!("Skipping job '{}': {:#}", job.id, e),
            }
        }

        let armed = mapping.len();
        let previous = lock(&self.state).replace(ScheduleState {
            jobs: mapping,
            registry: registry.clone(),
        });
        if let Some(previous) = previous {
            previous.registry.stop();
            previous.registry.clear();
        }
        registry.start();

        info!(
            "Schedule refreshed: {} jobs armed in {}",
            armed,
            format_duration(start.elapsed())
        );
        Ok(armed)
    }

    async fn on_job_fire(&self, job: &Job) -> usize {
        let tz = &self.settings.timezone;
        info!("Job '{}' fired ({})", job.id, job.comments);

        let today = Utc::now().with_timezone(tz).date_naive();
        let (Some(from), Some(until)) = (
            day_start(tz, today, job.start_offset_days),
            day_start(tz, today, job.end_offset_days),
        ) else {
            error!("Job '{}' has an out of range alert window", job.id);
            return 0;
        };

        let filter = AlertFilter::migrating_between(from, until)
            .ready_only(self.settings.require_ready_to_send);
        let alerts = match self.alerts.list(&filter).await {
            Ok(alerts) => alerts,
            Err(e) => {
                error!("Job '{}': failed to query alerts: {}", job.id, e);
                return 0;
            }
        };
        debug!(
            "Job '{}' selected {} alerts migrating in [{}, {})",
            job.id,
            alerts.len(),
            from,
            until
        );

        let mut queued = 0;
        for alert in alerts {
            if alert.distribution_list.is_empty() {
                warn!(
                    "Job '{}': alert '{}' has no recipients, skipping",
                    job.id, alert.migration_id
                );
                continue;
            }

            let mut context = alert.mail_context(tz);
            context.insert("JobComments".to_string(), job.comments.clone().into());

            let message = OutboundMessage {
                to: alert.distribution_list.clone(),
                from: self.settings.from_address.clone(),
                subject: job.mail_subject.clone(),
                template_name: job.template_name.clone(),
                context,
            };
            match self.outbox.enqueue(message).await {
                Ok(()) => queued += 1,
                Err(e) => error!(
                    "Job '{}': could not queue mail for alert '{}': {}",
                    job.id, alert.migration_id, e
                ),
            }
        }

        info!("Job '{}' queued {} messages", job.id, queued);
        queued
    }
}
