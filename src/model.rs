use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

use crate::utils::format_mail_date;

/// Key/value data handed to the template renderer.
pub type MailContext = BTreeMap<String, serde_json::Value>;

/// A recurring schedule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub cron_expression: String,
    /// Alerts are selected in `[today + start_offset_days, today + end_offset_days)`
    pub start_offset_days: i64,
    pub end_offset_days: i64,
    pub template_name: String,
    pub mail_subject: String,
    #[serde(default)]
    pub comments: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub added_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewJob {
    pub cron_expression: String,
    pub start_offset_days: i64,
    pub end_offset_days: i64,
    pub template_name: String,
    pub mail_subject: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub added_by: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub cron_expression: Option<String>,
    pub start_offset_days: Option<i64>,
    pub end_offset_days: Option<i64>,
    pub template_name: Option<String>,
    pub mail_subject: Option<String>,
    pub comments: Option<String>,
}

impl JobUpdate {
    pub fn apply(&self, job: &mut Job) {
        if let Some(v) = &self.cron_expression {
            job.cron_expression = v.clone();
        }
        if let Some(v) = self.start_offset_days {
            job.start_offset_days = v;
        }
        if let Some(v) = self.end_offset_days {
            job.end_offset_days = v;
        }
        if let Some(v) = &self.template_name {
            job.template_name = v.clone();
        }
        if let Some(v) = &self.mail_subject {
            job.mail_subject = v.clone();
        }
        if let Some(v) = &self.comments {
            job.comments = v.clone();
        }
    }
}

/// Readiness of an alert. `Unset` is kept distinct from `No` so that partial
/// updates which do not mention readiness never revoke it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum ReadyToSend {
    #[default]
    Unset,
    Yes,
    No,
}

impl ReadyToSend {
    pub fn is_set(self) -> bool {
        self != ReadyToSend::Unset
    }

    pub fn is_ready(self) -> bool {
        self == ReadyToSend::Yes
    }

    /// Returns `self` if explicitly set, otherwise `previous`.
    pub fn or(self, previous: ReadyToSend) -> ReadyToSend {
        if self.is_set() {
            self
        } else {
            previous
        }
    }
}

impl From<Option<bool>> for ReadyToSend {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => ReadyToSend::Unset,
            Some(true) => ReadyToSend::Yes,
            Some(false) => ReadyToSend::No,
        }
    }
}

impl From<ReadyToSend> for Option<bool> {
    fn from(value: ReadyToSend) -> Self {
        match value {
            ReadyToSend::Unset => None,
            ReadyToSend::Yes => Some(true),
            ReadyToSend::No => Some(false),
        }
    }
}

/// A migration event awaiting notification.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub migration_id: String,
    #[serde(default)]
    pub volumes: Vec<String>,
    pub alert_type: String,
    pub migration_date: DateTime<Utc>,
    #[serde(default)]
    pub distribution_list: Vec<String>,
    pub alert_status: Option<String>,
    pub alert_sent_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_ready_to_send: ReadyToSend,
}

impl Alert {
    /// Template data describing this alert, dates rendered in `tz`.
    pub fn mail_context(&self, tz: &Tz) -> MailContext {
        let mut context = MailContext::new();
        context.insert("MigrationId".to_string(), json!(self.migration_id));
        context.insert("Volumes".to_string(), json!(self.volumes));
        context.insert(
            "MigrationDate".to_string(),
            json!(format_mail_date(&self.migration_date, tz)),
        );
        context.insert("AlertType".to_string(), json!(self.alert_type));
        context
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAlert {
    pub migration_id: String,
    #[serde(default)]
    pub volumes: Vec<String>,
    pub migration_date: DateTime<Utc>,
    #[serde(default)]
    pub distribution_list: Vec<String>,
    #[serde(default)]
    pub alert_status: Option<String>,
    #[serde(default)]
    pub is_ready_to_send: ReadyToSend,
}

/// Partial alert update. Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdate {
    /// Only accepted when equal to the key the update is addressed to.
    pub migration_id: Option<String>,
    pub volumes: Option<Vec<String>>,
    pub migration_date: Option<DateTime<Utc>>,
    pub distribution_list: Option<Vec<String>>,
    pub alert_status: Option<String>,
    pub alert_sent_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_ready_to_send: ReadyToSend,
    /// Approval signal from the caller, not stored.
    pub is_approved: Option<bool>,
}

impl AlertUpdate {
    pub fn apply(&self, alert: &mut Alert) {
        if let Some(v) = &self.volumes {
            alert.volumes = v.clone();
        }
        if let Some(v) = self.migration_date {
            alert.migration_date = v;
        }
        if let Some(v) = &self.distribution_list {
            alert.distribution_list = v.clone();
        }
        if let Some(v) = &self.alert_status {
            alert.alert_status = Some(v.clone());
        }
        if let Some(v) = self.alert_sent_time {
            alert.alert_sent_time = Some(v);
        }
        alert.is_ready_to_send = self.is_ready_to_send.or(alert.is_ready_to_send);
    }
}

/// A unit of work for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    /// Empty means the message is sent with an empty body.
    pub template_name: String,
    pub context: MailContext,
}
