//! Alert lifecycle: record operations on alerts and the one-off mails tied
//! to them (creation, approval and rejection of a migration date change).

use chrono::Utc;
use chrono_tz::Tz;
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::dispatcher::Outbox;
use crate::error::{ServiceError, ServiceResult};
use crate::model::{Alert, AlertUpdate, NewAlert, OutboundMessage};
use crate::store::{AlertFilter, AlertStore};
use crate::utils::day_start;

pub const CREATED_SUBJECT: &str = "Migration Request Created";
pub const APPROVED_SUBJECT: &str = "Migration Date Change Approved";
pub const REJECTED_SUBJECT: &str = "Migration Date Change Rejected";

const ALERT_TYPE: &str = "email";

/// Days ahead covered by [`AlertService::upcoming`].
const UPCOMING_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct AlertMailSettings {
    pub from_address: String,
    /// Receives the "created" mail of every new alert.
    pub created_recipient: String,
    pub default_template: String,
    pub approved_template: Option<String>,
    pub rejected_template: Option<String>,
    pub timezone: Tz,
}

pub struct AlertService {
    store: Arc<dyn AlertStore>,
    outbox: Outbox,
    settings: AlertMailSettings,
}

impl AlertService {
    pub fn new(store: Arc<dyn AlertStore>, outbox: Outbox, settings: AlertMailSettings) -> Self {
        Self {
            store,
            outbox,
            settings,
        }
    }

    pub async fn create(&self, new: NewAlert) -> ServiceResult<Alert> {
        if new.migration_id.trim().is_empty() {
            return Err(ServiceError::Validation("migrationId must not be empty".to_string()));
        }
        if self.store.get(&new.migration_id).await?.is_some() {
            return Err(ServiceError::Validation(format!(
                "an alert for migration '{}' already exists",
                new.migration_id
            )));
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            migration_id: new.migration_id,
            volumes: new.volumes,
            alert_type: ALERT_TYPE.to_string(),
            migration_date: new.migration_date,
            distribution_list: new.distribution_list,
            alert_status: new.alert_status,
            alert_sent_time: None,
            is_ready_to_send: new.is_ready_to_send,
        };
        self.store.create(&alert).await?;
        info!("Created alert for migration '{}'", alert.migration_id);

        self.notify(
            &alert,
            CREATED_SUBJECT,
            vec![self.settings.created_recipient.clone()],
            &self.settings.default_template,
        )
        .await;

        Ok(alert)
    }

    pub async fn get(&self, migration_id: &str) -> ServiceResult<Alert> {
        self.store
            .get(migration_id)
            .await?
            .ok_or_else(|| not_found(migration_id))
    }

    pub async fn list(&self, filter: &AlertFilter) -> ServiceResult<Vec<Alert>> {
        Ok(self.store.list(filter).await?)
    }

    /// Ready alerts migrating within the next week, today included. Alerts
    /// not explicitly marked ready are left out.
    pub async fn upcoming(&self) -> ServiceResult<Vec<Alert>> {
        let tz = &self.settings.timezone;
        let today = Utc::now().with_timezone(tz).date_naive();
        let (Some(from), Some(until)) = (
            day_start(tz, today, 0),
            day_start(tz, today, UPCOMING_DAYS),
        ) else {
            return Err(ServiceError::Validation("date out of range".to_string()));
        };
        self.list(&AlertFilter::migrating_between(from, until).ready_only(true))
            .await
    }

    /// Applies a partial update. Readiness not mentioned in the update is
    /// kept. A new migration date signalled as approved mails the approval;
    /// a rejection of a ready alert mails the rejection. Both checks are
    /// independent.
    pub async fn update(&self, migration_id: &str, update: AlertUpdate) -> ServiceResult<Alert> {
        if let Some(requested) = &update.migration_id {
            if requested != migration_id {
                return Err(ServiceError::Validation(format!(
                    "migrationId cannot be changed (from '{}' to '{}')",
                    migration_id, requested
                )));
            }
        }

        let mut alert = self.get(migration_id).await?;
        update.apply(&mut alert);

        if self.store.update(&alert).await? == 0 {
            return Err(not_found(migration_id));
        }
        info!("Updated alert for migration '{}'", migration_id);

        if update.migration_date.is_some() && update.is_approved == Some(true) {
            self.notify(
                &alert,
                APPROVED_SUBJECT,
                alert.distribution_list.clone(),
                self.template_or_default(&self.settings.approved_template),
            )
            .await;
        }

        if update.is_approved == Some(false) && alert.is_ready_to_send.is_ready() {
            self.notify(
                &alert,
                REJECTED_SUBJECT,
                alert.distribution_list.clone(),
                self.template_or_default(&self.settings.rejected_template),
            )
            .await;
        }

        Ok(alert)
    }

    pub async fn delete(&self, migration_id: &str) -> ServiceResult<()> {
        if self.store.delete(migration_id).await? == 0 {
            return Err(not_found(migration_id));
        }
        info!("Deleted alert for migration '{}'", migration_id);
        Ok(())
    }

    fn template_or_default<'a>(&'a self, template: &'a Option<String>) -> &'a str {
        template
            .as_deref()
            .unwrap_or(&self.settings.default_template)
    }

    /// Queues a mail about `alert`. Failing to queue does not fail the
    /// operation that triggered it.
    async fn notify(&self, alert: &Alert, subject: &str, to: Vec<String>, template: &str) {
        if to.is_empty() {
            warn!(
                "No recipients for '{}' on migration '{}', not sending",
                subject, alert.migration_id
            );
            return;
        }

        let message = OutboundMessage {
            to,
            from: self.settings.from_address.clone(),
            subject: subject.to_string(),
            template_name: template.to_string(),
            context: alert.mail_context(&self.settings.timezone),
        };
        if let Err(e) = self.outbox.enqueue(message).await {
            error!(
                "Could not queue '{}' for migration '{}': {}",
                subject, alert.migration_id, e
            );
        }
    }
}

fn not_found(migration_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("alert for migration '{}'", migration_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::mail::testing::{EchoRenderer, RecordingTransport};
    use crate::mail::Mail;
    use crate::model::ReadyToSend;
    use crate::store::memory::MemoryStore;
    use chrono::{DateTime, TimeDelta};

    struct Fixture {
        store: Arc<MemoryStore>,
        transport: Arc<RecordingTransport>,
        dispatcher: Dispatcher,
        service: AlertService,
    }

    impl Fixture {
        /// Shuts the dispatcher down and returns every mail it sent.
        async fn sent(self) -> Vec<Mail> {
            drop(self.service);
            self.dispatcher.shutdown().await;
            self.transport.sent()
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Dispatcher::start(1, 16, Arc::new(EchoRenderer), transport.clone());
        let service = AlertService::new(
            store.clone(),
            dispatcher.outbox(),
            AlertMailSettings {
                from_address: "noreply@example.com".to_string(),
                created_recipient: "migrations@example.com".to_string(),
                default_template: "basic.page.tmpl".to_string(),
                approved_template: Some("approved.page.tmpl".to_string()),
                rejected_template: None,
                timezone: Tz::UTC,
            },
        );
        Fixture {
            store,
            transport,
            dispatcher,
            service,
        }
    }

    fn days_from_now(days: i64) -> DateTime<Utc> {
        Utc::now() + TimeDelta::days(days)
    }

    fn new_alert(migration_id: &str, ready: ReadyToSend) -> NewAlert {
        NewAlert {
            migration_id: migration_id.to_string(),
            volumes: vec!["vol1".to_string()],
            migration_date: days_from_now(3),
            distribution_list: vec!["a@x.com".to_string(), "b@x.com".to_string()],
            alert_status: None,
            is_ready_to_send: ready,
        }
    }

    #[tokio::test]
    async fn create_stores_alert_and_mails_fixed_recipient() {
        let f = fixture();
        let alert = f
            .service
            .create(new_alert("M1", ReadyToSend::Unset))
            .await
            .unwrap();

        assert_eq!(alert.alert_type, "email");
        assert!(Uuid::parse_str(&alert.id).is_ok());
        assert_eq!(f.service.get("M1").await.unwrap(), alert);

        let sent = f.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, CREATED_SUBJECT);
        assert_eq!(sent[0].to, vec!["migrations@example.com".to_string()]);
        assert_eq!(sent[0].body, "basic.page.tmpl|M1");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_migration() {
        let f = fixture();
        f.service
            .create(new_alert("M1", ReadyToSend::Unset))
            .await
            .unwrap();
        let err = f
            .service
            .create(new_alert("M1", ReadyToSend::Yes))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = f
            .service
            .create(new_alert("  ", ReadyToSend::Yes))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(f.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn update_carries_readiness_forward() {
        let f = fixture();
        f.service
            .create(new_alert("M1", ReadyToSend::Yes))
            .await
            .unwrap();

        let updated = f
            .service
            .update(
                "M1",
                AlertUpdate {
                    alert_status: Some("scheduled".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.is_ready_to_send, ReadyToSend::Yes);
        assert_eq!(updated.alert_status.as_deref(), Some("scheduled"));

        let updated = f
            .service
            .update(
                "M1",
                AlertUpdate {
                    is_ready_to_send: ReadyToSend::No,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.is_ready_to_send, ReadyToSend::No);
        assert_eq!(
            f.service.get("M1").await.unwrap().is_ready_to_send,
            ReadyToSend::No
        );
    }

    #[tokio::test]
    async fn update_cannot_change_migration_id() {
        let f = fixture();
        f.service
            .create(new_alert("M1", ReadyToSend::Yes))
            .await
            .unwrap();

        let err = f
            .service
            .update(
                "M1",
                AlertUpdate {
                    migration_id: Some("M2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Repeating the current key is fine.
        f.service
            .update(
                "M1",
                AlertUpdate {
                    migration_id: Some("M1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn approved_date_change_mails_distribution_list() {
        let f = fixture();
        f.service
            .create(new_alert("M1", ReadyToSend::Yes))
            .await
            .unwrap();

        f.service
            .update(
                "M1",
                AlertUpdate {
                    migration_date: Some(days_from_now(10)),
                    is_approved: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Approval without a new date mails nothing.
        f.service
            .update(
                "M1",
                AlertUpdate {
                    is_approved: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let sent = f.sent().await;
        let approved: Vec<_> = sent
            .iter()
            .filter(|m| m.subject == APPROVED_SUBJECT)
            .collect();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].to, vec!["a@x.com", "b@x.com"]);
        assert_eq!(approved[0].body, "approved.page.tmpl|M1");
    }

    #[tokio::test]
    async fn rejection_mails_only_ready_alerts() {
        let f = fixture();
        f.service
            .create(new_alert("READY", ReadyToSend::Yes))
            .await
            .unwrap();
        f.service
            .create(new_alert("UNSET", ReadyToSend::Unset))
            .await
            .unwrap();

        for id in ["READY", "UNSET"] {
            f.service
                .update(
                    id,
                    AlertUpdate {
                        is_approved: Some(false),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let rejected: Vec<_> = f
            .sent()
            .await
            .into_iter()
            .filter(|m| m.subject == REJECTED_SUBJECT)
            .collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].body, "basic.page.tmpl|READY");
    }

    #[tokio::test]
    async fn approval_and_rejection_guards_are_independent() {
        let f = fixture();
        f.service
            .create(new_alert("M1", ReadyToSend::Unset))
            .await
            .unwrap();

        // A rejection that also marks the alert ready mails the rejection
        // even though it carries a new date.
        f.service
            .update(
                "M1",
                AlertUpdate {
                    migration_date: Some(days_from_now(5)),
                    is_ready_to_send: ReadyToSend::Yes,
                    is_approved: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let subjects: Vec<_> = f.sent().await.into_iter().map(|m| m.subject).collect();
        assert_eq!(subjects, vec![CREATED_SUBJECT, REJECTED_SUBJECT]);
    }

    #[tokio::test]
    async fn delete_distinguishes_not_found_from_store_failure() {
        let f = fixture();
        f.service
            .create(new_alert("M1", ReadyToSend::Yes))
            .await
            .unwrap();

        f.service.delete("M1").await.unwrap();
        assert!(matches!(
            f.service.delete("M1").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.get("M1").await,
            Err(ServiceError::NotFound(_))
        ));

        f.store.fail_writes(true);
        assert!(matches!(
            f.service.delete("M2").await,
            Err(ServiceError::Store(_))
        ));
    }

    #[tokio::test]
    async fn update_of_unknown_alert_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .update("NOPE", AlertUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn upcoming_lists_ready_alerts_of_the_next_week() {
        let f = fixture();
        f.service
            .create(new_alert("SOON", ReadyToSend::Yes))
            .await
            .unwrap();
        f.service
            .create(new_alert("UNSET", ReadyToSend::Unset))
            .await
            .unwrap();
        let mut later = new_alert("LATER", ReadyToSend::Yes);
        later.migration_date = days_from_now(30);
        f.service.create(later).await.unwrap();

        let upcoming: Vec<_> = f
            .service
            .upcoming()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.migration_id)
            .collect();
        assert_eq!(upcoming, vec!["SOON"]);
        assert_eq!(f.service.list(&AlertFilter::all()).await.unwrap().len(), 3);
    }
}
