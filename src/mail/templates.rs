//! Mail body templates, loaded once at startup from a directory.
//!
//! Every file in the directory becomes a template named after its file name,
//! so page templates can `{% extends %}` or `{% include %}` shared layouts.

use anyhow::{Context, Result};
use log::info;
use minijinja::{Environment, ErrorKind};
use std::path::Path;

use super::{TemplateError, TemplateRenderer};
use crate::model::MailContext;

pub struct TemplateStore {
    env: Environment<'static>,
}

impl TemplateStore {
    pub fn load(dir: &Path) -> Result<Self> {
        let mut sources = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read templates directory '{}'", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template '{}'", path.display()))?;
            sources.push((name, source));
        }

        let store = Self::from_sources(sources)?;
        info!(
            "Loaded {} mail templates from '{}'",
            store.env.templates().count(),
            dir.display()
        );
        Ok(store)
    }

    pub fn from_sources<I>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env = Environment::new();
        for (name, source) in sources {
            env.add_template_owned(name.clone(), source)
                .with_context(|| format!("Malformed template '{}'", name))?;
        }
        Ok(Self { env })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }
}

impl TemplateRenderer for TemplateStore {
    fn render(&self, name: &str, context: &MailContext) -> Result<String, TemplateError> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => TemplateError::NotFound(name.to_string()),
            _ => TemplateError::Render {
                name: name.to_string(),
                reason: e.to_string(),
            },
        })?;

        template.render(context).map_err(|e| TemplateError::Render {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> TemplateStore {
        TemplateStore::from_sources([
            (
                "base.layout.tmpl".to_string(),
                "<html>{% block content %}{% endblock %}</html>".to_string(),
            ),
            (
                "created.page.tmpl".to_string(),
                "{% extends \"base.layout.tmpl\" %}{% block content %}Migration {{ MigrationId }} on {{ MigrationDate }}: {{ Volumes | join(\", \") }}{% endblock %}".to_string(),
            ),
            (
                "strict.page.tmpl".to_string(),
                "{{ MigrationId.missing.deeper }}".to_string(),
            ),
        ])
        .unwrap()
    }

    fn context() -> MailContext {
        let mut context = MailContext::new();
        context.insert("MigrationId".to_string(), json!("M1"));
        context.insert("MigrationDate".to_string(), json!("02 Jan 24 15:04 UTC"));
        context.insert("Volumes".to_string(), json!(["vol1", "vol2"]));
        context
    }

    #[test]
    fn renders_page_with_layout() {
        let body = store().render("created.page.tmpl", &context()).unwrap();
        assert_eq!(
            body,
            "<html>Migration M1 on 02 Jan 24 15:04 UTC: vol1, vol2</html>"
        );
    }

    #[test]
    fn unknown_template_is_not_found() {
        let err = store().render("nope.page.tmpl", &context()).unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(name) if name == "nope.page.tmpl"));
    }

    #[test]
    fn failed_render_is_reported() {
        let err = store().render("strict.page.tmpl", &context()).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }

    #[test]
    fn malformed_template_fails_to_load() {
        let result = TemplateStore::from_sources([(
            "broken.page.tmpl".to_string(),
            "{% if %}".to_string(),
        )]);
        assert!(result.is_err());
        assert!(store().contains("created.page.tmpl"));
    }

    #[test]
    fn loads_templates_from_directory() {
        let dir = std::env::temp_dir().join(format!("mailer-templates-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hello.page.tmpl"), "Hello {{ MigrationId }}").unwrap();

        let store = TemplateStore::load(&dir).unwrap();
        assert_eq!(store.render("hello.page.tmpl", &context()).unwrap(), "Hello M1");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
