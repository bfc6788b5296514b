//! A set of recurring triggers, each running an async action on its own
//! schedule.
//!
//! Every armed entry is a tokio task that sleeps until the next fire time and
//! then runs its action to completion, so firings of one entry never overlap.
//! Different entries are independent of each other.

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::cron::Schedule;
use crate::utils::format_duration;

pub type Action = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Wraps an async closure into an [`Action`].
pub fn action<F, Fut>(f: F) -> Action
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub id: EntryId,
    pub spec: String,
    pub next: Option<DateTime<Utc>>,
}

struct Entry {
    spec: String,
    schedule: Schedule,
    action: Action,
    task: Option<ArmedTask>,
}

struct ArmedTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    running: bool,
    next_id: u64,
    entries: BTreeMap<EntryId, Entry>,
}

pub struct CronRegistry {
    timezone: Tz,
    state: Mutex<RegistryState>,
}

impl CronRegistry {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `action` on `spec`. Armed right away if the registry runs.
    pub fn add(&self, spec: &str, action: Action) -> Result<EntryId> {
        let schedule = Schedule::parse(spec)?;
        let mut state = self.lock();

        let id = EntryId(state.next_id);
        state.next_id += 1;

        let task = state
            .running
            .then(|| self.arm(spec, &schedule, &action));

        state.entries.insert(
            id,
            Entry {
                spec: spec.to_string(),
                schedule,
                action,
                task,
            },
        );
        Ok(id)
    }

    /// Disarms and forgets an entry. Returns false if it was unknown.
    #[cfg(test)]
    pub fn remove(&self, id: EntryId) -> bool {
        let entry = self.lock().entries.remove(&id);
        match entry {
            Some(mut entry) => {
                disarm(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.lock().entries);
        for (_, mut entry) in entries {
            disarm(&mut entry);
        }
    }

    pub fn start(&self) {
        let mut state = self.lock();
        if state.running {
            return;
        }
        state.running = true;

        for entry in state.entries.values_mut() {
            entry.task = Some(self.arm(&entry.spec, &entry.schedule, &entry.action));
        }
    }

    /// Prevents future firings. Actions already running are left to finish.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.running = false;
        for entry in state.entries.values_mut() {
            disarm(entry);
        }
    }

    /// Like [`stop`](Self::stop), then waits for running actions to finish.
    pub async fn drain(&self) {
        let handles = {
            let mut state = self.lock();
            state.running = false;
            state
                .entries
                .values_mut()
                .filter_map(|entry| entry.task.take())
                .map(|task| {
                    let _ = task.stop.send(());
                    task.handle
                })
                .collect::<Vec<_>>()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Trigger task ended abnormally: {}", e);
            }
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = Utc::now().with_timezone(&self.timezone);
        self.lock()
            .entries
            .iter()
            .map(|(id, entry)| EntryInfo {
                id: *id,
                spec: entry.spec.clone(),
                next: entry
                    .schedule
                    .next_after(&now)
                    .map(|next| next.with_timezone(&Utc)),
            })
            .collect()
    }

    fn arm(&self, spec: &str, schedule: &Schedule, action: &Action) -> ArmedTask {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(run_entry(
            spec.to_string(),
            schedule.clone(),
            self.timezone,
            action.clone(),
            stopped,
        ));
        ArmedTask { stop, handle }
    }
}

fn disarm(entry: &mut Entry) {
    if let Some(task) = entry.task.take() {
        let _ = task.stop.send(());
    }
}

async fn run_entry(
    spec: String,
    schedule: Schedule,
    timezone: Tz,
    action: Action,
    mut stopped: oneshot::Receiver<()>,
) {
    let mut last_fire: Option<DateTime<Tz>> = None;

    loop {
        let Some((delay, at)) = next_delay(&schedule, &timezone, last_fire.as_ref()) else {
            warn!("Schedule '{}' will never fire again, disarming it", spec);
            return;
        };
        debug!(
            "Schedule '{}' fires next at {} (in {})",
            spec,
            at,
            format_duration(delay)
        );

        tokio::select! {
            biased;
            _ = &mut stopped => break,
            _ = sleep(delay) => {}
        }

        last_fire = Some(at);
        action().await;
    }

    debug!("Schedule '{}' disarmed", spec);
}

/// Time to wait before the next firing, and the firing's wall-clock time.
///
/// Interval schedules count from the previous firing. Cron schedules never
/// fire twice for the same slot, even when the sleep wakes slightly early.
fn next_delay(
    schedule: &Schedule,
    timezone: &Tz,
    last_fire: Option<&DateTime<Tz>>,
) -> Option<(Duration, DateTime<Tz>)> {
    let now = Utc::now().with_timezone(timezone);

    match schedule {
        Schedule::Every { interval } => {
            let at = now.checked_add_signed(TimeDelta::from_std(*interval).ok()?)?;
            Some((*interval, at))
        }
        Schedule::When { .. } => {
            let base = match last_fire {
                Some(last) if *last > now => last.clone(),
                _ => now.clone(),
            };
            let at = schedule.next_after(&base)?;
            let delay = at
                .clone()
                .signed_duration_since(&now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            Some((delay, at))
        }
    }
}
