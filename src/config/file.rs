use anyhow::Context;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::path::PathBuf;
use std::time::Duration;

use super::logging::LoggingConfig;

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    pub mail: MailConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: String,
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    /// Falls back to the `SMTP_PASSWORD` environment variable.
    #[serde(default)]
    pub password: Option<String>,
    /// STARTTLS relay when set, plain connection otherwise
    #[serde(default)]
    pub tls: bool,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default, rename = "timeout_secs")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    pub from_address: String,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    pub default_template: String,
    pub created_recipient: String,
    #[serde(default)]
    pub approved_template: Option<String>,
    #[serde(default)]
    pub rejected_template: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(default = "default_job_refresh")]
    pub job_refresh: String,
    /// IANA name; the system zone when missing
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub require_ready_to_send: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            job_refresh: default_job_refresh(),
            timezone: None,
            require_ready_to_send: true,
        }
    }
}

fn default_smtp_port() -> u16 {
    25
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("./templates")
}

fn default_job_refresh() -> String {
    "0 0 * * *".to_string()
}

fn default_true() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<ConfigFile> {
    let content = std::fs::read_to_string(path).context("Failed to read config file")?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> anyhow::Result<ConfigFile> {
    let config = serde_yml::from_str(content).context("Failed to parse config file")?;
    Ok(config)
}
