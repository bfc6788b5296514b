use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Row, Value};
use log::{debug, info};

use super::{AlertFilter, AlertStore, JobFilter, JobStore};
use crate::error::StoreError;
use crate::model::{Alert, Job, ReadyToSend};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    cron_expression TEXT NOT NULL,
    start_offset_days INTEGER NOT NULL,
    end_offset_days INTEGER NOT NULL,
    template_name TEXT NOT NULL,
    mail_subject TEXT NOT NULL,
    comments TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    added_by TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT NOT NULL,
    migration_id TEXT PRIMARY KEY,
    volumes TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    migration_date INTEGER NOT NULL,
    distribution_list TEXT NOT NULL,
    alert_status TEXT,
    alert_sent_time INTEGER,
    is_ready_to_send INTEGER
);
CREATE INDEX IF NOT EXISTS alerts_migration_date ON alerts (migration_date);
";

const JOB_COLUMNS: &str = "id, cron_expression, start_offset_days, end_offset_days, \
     template_name, mail_subject, comments, created_at, added_by";

const ALERT_COLUMNS: &str = "id, migration_id, volumes, alert_type, migration_date, \
     distribution_list, alert_status, alert_sent_time, is_ready_to_send";

/// Job and alert store on a local libsql database. Timestamps are kept as UTC
/// epoch milliseconds, lists as JSON text.
pub struct LibsqlStore {
    _db: Database,
    conn: Connection,
}

impl LibsqlStore {
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        conn.execute_batch(SCHEMA).await?;
        info!("Opened database '{}'", path);

        Ok(Self { _db: db, conn })
    }

    async fn query_jobs(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Job>, StoreError> {
        debug!("Query: {}", sql);
        let mut rows = self.conn.query(sql, Params::Positional(params)).await?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(job_from_row(&row)?);
        }
        Ok(jobs)
    }

    async fn query_alerts(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Alert>, StoreError> {
        debug!("Query: {}", sql);
        let mut rows = self.conn.query(sql, Params::Positional(params)).await?;
        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(alert_from_row(&row)?);
        }
        Ok(alerts)
    }
}

#[async_trait]
impl JobStore for LibsqlStore {
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let mut sql = format!("SELECT {} FROM jobs", JOB_COLUMNS);
        let mut params = Vec::new();
        if let Some(added_by) = &filter.added_by {
            sql.push_str(" WHERE added_by = ?1");
            params.push(Value::Text(added_by.clone()));
        }
        sql.push_str(" ORDER BY created_at, id");
        self.query_jobs(&sql, params).await
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let jobs = self.query_jobs(&sql, vec![Value::Text(id.to_string())]).await?;
        Ok(jobs.into_iter().next())
    }

    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            JOB_COLUMNS
        );
        self.conn
            .execute(
                &sql,
                Params::Positional(vec![
                    Value::Text(job.id.clone()),
                    Value::Text(job.cron_expression.clone()),
                    Value::Integer(job.start_offset_days),
                    Value::Integer(job.end_offset_days),
                    Value::Text(job.template_name.clone()),
                    Value::Text(job.mail_subject.clone()),
                    Value::Text(job.comments.clone()),
                    Value::Integer(job.created_at.timestamp_millis()),
                    Value::Text(job.added_by.clone()),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<u64, StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE jobs SET cron_expression = ?2, start_offset_days = ?3, \
                 end_offset_days = ?4, template_name = ?5, mail_subject = ?6, comments = ?7 \
                 WHERE id = ?1",
                Params::Positional(vec![
                    Value::Text(job.id.clone()),
                    Value::Text(job.cron_expression.clone()),
                    Value::Integer(job.start_offset_days),
                    Value::Integer(job.end_offset_days),
                    Value::Text(job.template_name.clone()),
                    Value::Text(job.mail_subject.clone()),
                    Value::Text(job.comments.clone()),
                ]),
            )
            .await?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM jobs WHERE id = ?1",
                Params::Positional(vec![Value::Text(id.to_string())]),
            )
            .await?;
        Ok(deleted)
    }
}

#[async_trait]
impl AlertStore for LibsqlStore {
    async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(from) = filter.migration_from {
            params.push(Value::Integer(from.timestamp_millis()));
            conditions.push(format!("migration_date >= ?{}", params.len()));
        }
        if let Some(until) = filter.migration_until {
            params.push(Value::Integer(until.timestamp_millis()));
            conditions.push(format!("migration_date < ?{}", params.len()));
        }
        if filter.ready_only {
            conditions.push("is_ready_to_send = 1".to_string());
        }

        let mut sql = format!("SELECT {} FROM alerts", ALERT_COLUMNS);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY migration_date, migration_id");
        self.query_alerts(&sql, params).await
    }

    async fn get(&self, migration_id: &str) -> Result<Option<Alert>, StoreError> {
        let sql = format!("SELECT {} FROM alerts WHERE migration_id = ?1", ALERT_COLUMNS);
        let alerts = self
            .query_alerts(&sql, vec![Value::Text(migration_id.to_string())])
            .await?;
        Ok(alerts.into_iter().next())
    }

    async fn create(&self, alert: &Alert) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO alerts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            ALERT_COLUMNS
        );
        self.conn
            .execute(
                &sql,
                Params::Positional(vec![
                    Value::Text(alert.id.clone()),
                    Value::Text(alert.migration_id.clone()),
                    Value::Text(serde_json::to_string(&alert.volumes)?),
                    Value::Text(alert.alert_type.clone()),
                    Value::Integer(alert.migration_date.timestamp_millis()),
                    Value::Text(serde_json::to_string(&alert.distribution_list)?),
                    opt_text_value(&alert.alert_status),
                    opt_time_value(&alert.alert_sent_time),
                    ready_value(alert.is_ready_to_send),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn update(&self, alert: &Alert) -> Result<u64, StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE alerts SET volumes = ?2, alert_type = ?3, migration_date = ?4, \
                 distribution_list = ?5, alert_status = ?6, alert_sent_time = ?7, \
                 is_ready_to_send = ?8 WHERE migration_id = ?1",
                Params::Positional(vec![
                    Value::Text(alert.migration_id.clone()),
                    Value::Text(serde_json::to_string(&alert.volumes)?),
                    Value::Text(alert.alert_type.clone()),
                    Value::Integer(alert.migration_date.timestamp_millis()),
                    Value::Text(serde_json::to_string(&alert.distribution_list)?),
                    opt_text_value(&alert.alert_status),
                    opt_time_value(&alert.alert_sent_time),
                    ready_value(alert.is_ready_to_send),
                ]),
            )
            .await?;
        Ok(updated)
    }

    async fn delete(&self, migration_id: &str) -> Result<u64, StoreError> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM alerts WHERE migration_id = ?1",
                Params::Positional(vec![Value::Text(migration_id.to_string())]),
            )
            .await?;
        Ok(deleted)
    }
}

fn job_from_row(row: &Row) -> Result<Job, StoreError> {
    Ok(Job {
        id: text(row, 0)?,
        cron_expression: text(row, 1)?,
        start_offset_days: integer(row, 2)?,
        end_offset_days: integer(row, 3)?,
        template_name: text(row, 4)?,
        mail_subject: text(row, 5)?,
        comments: text(row, 6)?,
        created_at: timestamp(integer(row, 7)?)?,
        added_by: text(row, 8)?,
    })
}

fn alert_from_row(row: &Row) -> Result<Alert, StoreError> {
    let is_ready_to_send = match optional_integer(row, 8)? {
        None => ReadyToSend::Unset,
        Some(0) => ReadyToSend::No,
        Some(_) => ReadyToSend::Yes,
    };

    Ok(Alert {
        id: text(row, 0)?,
        migration_id: text(row, 1)?,
        volumes: serde_json::from_str(&text(row, 2)?)?,
        alert_type: text(row, 3)?,
        migration_date: timestamp(integer(row, 4)?)?,
        distribution_list: serde_json::from_str(&text(row, 5)?)?,
        alert_status: optional_text(row, 6)?,
        alert_sent_time: optional_integer(row, 7)?.map(timestamp).transpose()?,
        is_ready_to_send,
    })
}

fn text(row: &Row, idx: i32) -> Result<String, StoreError> {
    optional_text(row, idx)?
        .ok_or_else(|| StoreError::Decode(format!("column {} is unexpectedly null", idx)))
}

fn optional_text(row: &Row, idx: i32) -> Result<Option<String>, StoreError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(StoreError::Decode(format!(
            "column {} should be text, found {:?}",
            idx, other
        ))),
    }
}

fn integer(row: &Row, idx: i32) -> Result<i64, StoreError> {
    optional_integer(row, idx)?
        .ok_or_else(|| StoreError::Decode(format!("column {} is unexpectedly null", idx)))
}

fn optional_integer(row: &Row, idx: i32) -> Result<Option<i64>, StoreError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(n)),
        other => Err(StoreError::Decode(format!(
            "column {} should be an integer, found {:?}",
            idx, other
        ))),
    }
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Decode(format!("timestamp {} out of range", millis)))
}

fn opt_text_value(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn opt_time_value(value: &Option<DateTime<Utc>>) -> Value {
    match value {
        Some(t) => Value::Integer(t.timestamp_millis()),
        None => Value::Null,
    }
}

fn ready_value(ready: ReadyToSend) -> Value {
    match ready {
        ReadyToSend::Unset => Value::Null,
        ReadyToSend::Yes => Value::Integer(1),
        ReadyToSend::No => Value::Integer(0),
    }
}
