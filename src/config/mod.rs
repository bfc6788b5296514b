pub mod file;
pub mod logging;
pub mod validation;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use log::warn;
use std::path::PathBuf;

use crate::alerts::AlertMailSettings;
use crate::cron::Schedule;
use crate::scheduler::EngineSettings;

use self::file::{ConfigFile, SchedulerSection};
use self::logging::LoggingConfig;

pub use self::file::{DispatcherConfig, MailConfig, SmtpConfig};

pub const SMTP_PASSWORD_ENV: &str = "SMTP_PASSWORD";

#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database_path: String,
    pub smtp: SmtpConfig,
    pub dispatcher: DispatcherConfig,
    pub mail: MailConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cron expression of the job reload trigger
    pub job_refresh: String,
    pub timezone: Tz,
    pub require_ready_to_send: bool,
}

pub fn parse_config_file(file: &ConfigFile) -> Result<Config> {
    let mut smtp = file.smtp.clone();
    if smtp.password.is_none() {
        smtp.password = std::env::var(SMTP_PASSWORD_ENV).ok();
    }

    Ok(Config {
        logging: file.logging.clone().unwrap_or_default(),
        database_path: file.database.path.clone(),
        smtp,
        dispatcher: file.dispatcher.clone(),
        mail: file.mail.clone(),
        scheduler: SchedulerConfig::parse(&file.scheduler)?,
    })
}

impl SchedulerConfig {
    fn parse(section: &SchedulerSection) -> Result<Self> {
        Schedule::parse(&section.job_refresh).context("Malformed scheduler.job_refresh")?;

        let timezone = match &section.timezone {
            Some(name) => parse_timezone(name)?,
            None => system_timezone(),
        };

        Ok(Self {
            job_refresh: section.job_refresh.clone(),
            timezone,
            require_ready_to_send: section.require_ready_to_send,
        })
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("Unable to parse timezone '{}': {}", name, e))
}

fn system_timezone() -> Tz {
    match iana_time_zone::get_timezone() {
        Ok(name) => match name.parse() {
            Ok(tz) => tz,
            Err(_) => {
                warn!("Unknown system timezone '{}', using UTC", name);
                Tz::UTC
            }
        },
        Err(e) => {
            warn!("Unable to get system timezone ({}), using UTC", e);
            Tz::UTC
        }
    }
}

impl Config {
    pub fn templates_dir(&self) -> &PathBuf {
        &self.mail.templates_dir
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            from_address: self.mail.from_address.clone(),
            timezone: self.scheduler.timezone,
            require_ready_to_send: self.scheduler.require_ready_to_send,
        }
    }

    pub fn alert_mail_settings(&self) -> AlertMailSettings {
        AlertMailSettings {
            from_address: self.mail.from_address.clone(),
            created_recipient: self.mail.created_recipient.clone(),
            default_template: self.mail.default_template.clone(),
            approved_template: self.mail.approved_template.clone(),
            rejected_template: self.mail.rejected_template.clone(),
            timezone: self.scheduler.timezone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::parse_config_str;
    use crate::config::logging::LogOutput;
    use std::time::Duration;

    const MINIMAL: &str = r#"
database:
  path: ":memory:"
smtp:
  host: localhost
mail:
  from_address: noreply@example.com
  default_template: basic.page.tmpl
  created_recipient: migrations@example.com
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let file = parse_config_str(MINIMAL).unwrap();
        let config = parse_config_file(&file).unwrap();

        assert!(matches!(config.logging.output, LogOutput::Stdout));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.smtp.port, 25);
        assert!(!config.smtp.tls);
        assert_eq!(config.smtp.timeout, None);
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.dispatcher.queue_capacity, 100);
        assert_eq!(config.templates_dir(), &PathBuf::from("./templates"));
        assert_eq!(config.scheduler.job_refresh, "0 0 * * *");
        assert!(config.scheduler.require_ready_to_send);
    }

    #[test]
    fn full_config_is_parsed() {
        let file = parse_config_str(
            r#"
logging:
  output: file
  file: /tmp/mailer.log
  level: debug
database:
  path: mailer.db
smtp:
  host: smtp.example.com
  port: 587
  username: mailer
  password: secret
  tls: true
  timeout_secs: 30
dispatcher:
  workers: 8
  queue_capacity: 500
mail:
  from_address: noreply@example.com
  templates_dir: /etc/mailer/templates
  default_template: basic.page.tmpl
  created_recipient: migrations@example.com
  approved_template: approved.page.tmpl
scheduler:
  job_refresh: "*/15 * * * *"
  timezone: Europe/Madrid
  require_ready_to_send: false
"#,
        )
        .unwrap();
        let config = parse_config_file(&file).unwrap();

        assert!(matches!(config.logging.output, LogOutput::File));
        assert_eq!(config.logging.file_path(), PathBuf::from("/tmp/mailer.log"));
        assert_eq!(config.smtp.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.smtp.password.as_deref(), Some("secret"));
        assert_eq!(config.dispatcher.workers, 8);
        assert_eq!(config.scheduler.timezone, chrono_tz::Europe::Madrid);
        assert!(!config.scheduler.require_ready_to_send);

        let settings = config.alert_mail_settings();
        assert_eq!(settings.approved_template.as_deref(), Some("approved.page.tmpl"));
        assert_eq!(settings.rejected_template, None);
        assert_eq!(config.engine_settings().timezone, chrono_tz::Europe::Madrid);
    }

    #[test]
    fn invalid_refresh_schedule_is_fatal() {
        let yaml = format!("{}scheduler:\n  job_refresh: \"0 0 * *\"\n", MINIMAL);
        let file = parse_config_str(&yaml).unwrap();
        assert!(parse_config_file(&file).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = format!("{}smtp_workers: 3\n", MINIMAL);
        assert!(parse_config_str(&yaml).is_err());
    }

    #[test]
    fn unknown_timezone_is_fatal() {
        let yaml = format!("{}scheduler:\n  timezone: Mars/Olympus\n", MINIMAL);
        let file = parse_config_str(&yaml).unwrap();
        assert!(parse_config_file(&file).is_err());
    }
}
