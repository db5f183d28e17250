//! Notification templates
//!
//! This module provides:
//! - `NotificationSource`: what a domain event must expose to be rendered
//! - `TemplateEngine`: strict Handlebars rendering of subject and body
//! - The built-in `task_created` template
//!
//! Rendering is a pure function of the template and its context. Templates
//! never read the clock, so the same context always renders the same bytes.

use crate::error::{NotificationError, NotificationResult};
use handlebars::Handlebars;
use serde_json::Value;
use std::collections::HashMap;

/// Name of the built-in template sent when a task is created
pub const TASK_CREATED: &str = "task_created";

/// A domain event that can be turned into a notification.
///
/// Implementors hand over a snapshot: `context` must not change after the
/// source value is built.
pub trait NotificationSource: Send + Sync {
    /// Template to render
    fn template(&self) -> &str;

    /// Stable label for the event, e.g. `task:<uuid>`
    fn source_id(&self) -> String;

    /// Contact address of the recipient, if the owner has one
    fn recipient(&self) -> Option<&str>;

    /// Template variables
    fn context(&self) -> Value;
}

/// Rendered subject and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub subject: String,
    pub body: String,
}

/// Template definition
#[derive(Clone, Debug)]
pub struct NotificationTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
    /// Context fields that must be present and non-empty
    pub required: Vec<String>,
}

impl NotificationTemplate {
    pub fn new(name: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            body: body.into(),
            required: Vec::new(),
        }
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    fn check_required(&self, data: &Value) -> NotificationResult<()> {
        for field in &self.required {
            let present = match data.get(field) {
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(Value::Null) | None => false,
                Some(_) => true,
            };
            if !present {
                return Err(NotificationError::Render(format!(
                    "template '{}' requires non-empty field '{}'",
                    self.name, field
                )));
            }
        }
        Ok(())
    }
}

/// Handlebars-based template engine
///
/// Runs in strict mode, so a variable missing from the context is an error
/// rather than an empty string. Output is plain text and is not HTML-escaped.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    templates: HashMap<String, NotificationTemplate>,
}

impl TemplateEngine {
    /// Create a TemplateEngine with the built-in templates
    pub fn new() -> NotificationResult<Self> {
        let mut engine = Self::empty();
        engine.register(task_created_template())?;
        Ok(engine)
    }

    /// Create a TemplateEngine with no templates registered
    pub fn empty() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);

        Self {
            handlebars,
            templates: HashMap::new(),
        }
    }

    /// Register (or replace) a template
    pub fn register(&mut self, template: NotificationTemplate) -> NotificationResult<()> {
        self.handlebars
            .register_template_string(&format!("{}_subject", template.name), &template.subject)
            .map_err(|e| {
                NotificationError::Render(format!(
                    "invalid subject for template '{}': {}",
                    template.name, e
                ))
            })?;

        self.handlebars
            .register_template_string(&format!("{}_body", template.name), &template.body)
            .map_err(|e| {
                NotificationError::Render(format!(
                    "invalid body for template '{}': {}",
                    template.name, e
                ))
            })?;

        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Render a template by name
    pub fn render(&self, name: &str, data: &Value) -> NotificationResult<RenderedTemplate> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| NotificationError::Render(format!("template not found: {}", name)))?;

        template.check_required(data)?;

        let subject = self
            .handlebars
            .render(&format!("{}_subject", name), data)
            .map_err(|e| NotificationError::Render(format!("subject: {}", e)))?;

        let body = self
            .handlebars
            .render(&format!("{}_body", name), data)
            .map_err(|e| NotificationError::Render(format!("body: {}", e)))?;

        Ok(RenderedTemplate { subject, body })
    }

    /// Render the template a source asks for, with the source's context
    pub fn render_source(&self, source: &dyn NotificationSource) -> NotificationResult<RenderedTemplate> {
        self.render(source.template(), &source.context())
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn list_templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn task_created_template() -> NotificationTemplate {
    NotificationTemplate::new(
        TASK_CREATED,
        "New Task Created",
        r#"Hello {{owner_email}},

A new task has been created for you:

    {{task_content}}

Task ID: {{task_id}}
"#,
    )
    .require("task_id")
    .require("task_content")
    .require("owner_email")
}
