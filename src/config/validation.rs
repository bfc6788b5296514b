use lettre::message::Mailbox;
use std::path::Path;

use crate::config::file::ConfigFile;
use crate::config::logging::LogOutput;
use crate::config::{parse_timezone, SMTP_PASSWORD_ENV};
use crate::cron::Schedule;

#[derive(Debug, Clone)]
pub enum ValidationResult {
    Error(String),
    Warning(String),
}

impl ValidationResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::Error(_))
    }
}

fn validate_output_path(path: &Path) -> Option<String> {
    // If path exists, it must be a file
    if path.exists() && !path.is_file() {
        return Some(format!("Path '{}' exists but is not a file", path.display()));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            return Some(format!("Parent directory '{}' does not exist", parent.display()));
        }

        let readonly = std::fs::metadata(parent)
            .map(|m| m.permissions().readonly())
            .unwrap_or(true);
        if readonly {
            return Some(format!("Parent directory '{}' is not writable", parent.display()));
        }
    }

    None
}

fn validate_address(field: &str, address: &str) -> Option<ValidationResult> {
    match address.parse::<Mailbox>() {
        Ok(_) => None,
        Err(e) => Some(ValidationResult::Error(format!(
            "{}: invalid address '{}': {}",
            field, address, e
        ))),
    }
}

fn validate_logging_config(conf: &ConfigFile) -> Vec<ValidationResult> {
    let mut result = vec![];

    if let Some(logging) = &conf.logging {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&logging.level.as_str()) {
            result.push(ValidationResult::Error(format!(
                "Invalid log level '{}'. Must be one of: {}",
                logging.level,
                valid_levels.join(", ")
            )));
        }

        if logging.output == LogOutput::File {
            if logging.file.is_none() {
                result.push(ValidationResult::Warning(format!(
                    "Log output is set to 'file' but no file path specified, using '{}'",
                    logging.file_path().display()
                )));
            }
            if let Some(err) = validate_output_path(&logging.file_path()) {
                result.push(ValidationResult::Error(format!("Invalid log file: {}", err)));
            }
        }
    }

    result
}

fn validate_mail_config(conf: &ConfigFile) -> Vec<ValidationResult> {
    let mail = &conf.mail;
    let mut result = vec![];

    result.extend(validate_address("mail.from_address", &mail.from_address));
    result.extend(validate_address("mail.created_recipient", &mail.created_recipient));

    if !mail.templates_dir.is_dir() {
        result.push(ValidationResult::Error(format!(
            "Templates directory '{}' does not exist",
            mail.templates_dir.display()
        )));
        return result;
    }

    if mail.default_template.is_empty() {
        result.push(ValidationResult::Error(
            "mail.default_template must not be empty".to_string(),
        ));
    } else if !mail.templates_dir.join(&mail.default_template).is_file() {
        result.push(ValidationResult::Error(format!(
            "Default template '{}' not found in '{}'",
            mail.default_template,
            mail.templates_dir.display()
        )));
    }

    for (field, template) in [
        ("mail.approved_template", &mail.approved_template),
        ("mail.rejected_template", &mail.rejected_template),
    ] {
        if let Some(name) = template {
            if !mail.templates_dir.join(name).is_file() {
                result.push(ValidationResult::Warning(format!(
                    "{}: template '{}' not found in '{}'",
                    field,
                    name,
                    mail.templates_dir.display()
                )));
            }
        }
    }

    result
}

pub fn validate_config(conf: &ConfigFile) -> Vec<ValidationResult> {
    let mut result = vec![];

    // Refresh schedule and time zone
    if let Err(e) = Schedule::parse(&conf.scheduler.job_refresh) {
        result.push(ValidationResult::Error(format!(
            "scheduler.job_refresh: {:#}",
            e
        )));
    }
    if let Some(tz_name) = &conf.scheduler.timezone {
        if let Err(e) = parse_timezone(tz_name) {
            result.push(ValidationResult::Error(e.to_string()));
        }
    }
    if !conf.scheduler.require_ready_to_send {
        result.push(ValidationResult::Warning(
            "scheduler.require_ready_to_send is off: alerts are mailed whatever their readiness"
                .to_string(),
        ));
    }

    // Dispatcher sizing
    if conf.dispatcher.workers == 0 {
        result.push(ValidationResult::Error(
            "dispatcher.workers must be at least 1".to_string(),
        ));
    }
    if conf.dispatcher.queue_capacity == 0 {
        result.push(ValidationResult::Error(
            "dispatcher.queue_capacity must be at least 1".to_string(),
        ));
    }

    // SMTP
    if conf.smtp.host.trim().is_empty() {
        result.push(ValidationResult::Error("smtp.host must not be empty".to_string()));
    }
    if conf.smtp.username.is_some()
        && conf.smtp.password.is_none()
        && std::env::var(SMTP_PASSWORD_ENV).is_err()
    {
        result.push(ValidationResult::Warning(format!(
            "smtp.username is set but no password given (config or {}), AUTH disabled",
            SMTP_PASSWORD_ENV
        )));
    }

    // Database location
    if conf.database.path != ":memory:" {
        if let Some(err) = validate_output_path(Path::new(&conf.database.path)) {
            result.push(ValidationResult::Error(format!("Invalid database path: {}", err)));
        }
    }

    result.extend(validate_mail_config(conf));
    result.extend(validate_logging_config(conf));

    result
}
