//! Mail adapters: the built-in template store and a log-only mailer.
//!
//! Templates are keyed by name and locale, with `{{var}}` placeholders
//! filled from the scheduler's variable object. Lookup falls back to the
//! `en` rendition when a locale has no translation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::communication::MailMessage;
use crate::domain::ports::{DispatchError, Mailer, MessageTemplates};

/// Locale used when no translation exists for the requested one.
const FALLBACK_LOCALE: &str = "en";

/// Subject and body for one (template, locale) rendition.
#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    pub subject: String,
    pub body: String,
    pub footer: Option<String>,
}

/// In-process template store.
pub struct BuiltinTemplates {
    // template name -> locale -> rendition
    templates: HashMap<String, HashMap<String, TemplateDefinition>>,
}

impl BuiltinTemplates {
    /// Store pre-loaded with the stock reminder template.
    pub fn new() -> Self {
        let mut templates = Self {
            templates: HashMap::new(),
        };
        templates.insert(
            "assessment_reminder",
            FALLBACK_LOCALE,
            TemplateDefinition {
                subject: "Questionnaire {{qb_name}} is waiting for you".to_owned(),
                body: "Your {{qb_name}} questionnaire is due by {{due}}. \
                       Please sign in and complete it before {{expired}}."
                    .to_owned(),
                footer: Some("You receive this because reminders are enabled on your consent.".to_owned()),
            },
        );
        templates
    }

    pub fn insert(
        &mut self,
        template: impl Into<String>,
        locale: impl Into<String>,
        definition: TemplateDefinition,
    ) {
        self.templates
            .entry(template.into())
            .or_default()
            .insert(locale.into(), definition);
    }

    fn rendition(&self, template: &str, locale: &str) -> Option<&TemplateDefinition> {
        let locales = self.templates.get(template)?;
        locales.get(locale).or_else(|| locales.get(FALLBACK_LOCALE))
    }
}

impl Default for BuiltinTemplates {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace every `{{key}}` with the matching entry from `vars`.
fn substitute(text: &str, vars: &Value) -> String {
    let Some(map) = vars.as_object() else {
        return text.to_owned();
    };
    let mut out = text.to_owned();
    for (key, value) in map {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&format!("{{{{{key}}}}}"), &rendered);
    }
    out
}

impl MessageTemplates for BuiltinTemplates {
    fn render(
        &self,
        template: &str,
        locale: &str,
        vars: &Value,
    ) -> Result<MailMessage, DispatchError> {
        let recipient = vars
            .get("recipient")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::rejected("template vars carry no recipient"))?;
        let definition = self
            .rendition(template, locale)
            .ok_or_else(|| DispatchError::rejected(format!("unknown template {template}")))?;
        Ok(MailMessage {
            recipient: recipient.to_owned(),
            subject: substitute(&definition.subject, vars),
            body: substitute(&definition.body, vars),
            footer: definition.footer.clone(),
        })
    }
}

/// Mailer that records deliveries in the log instead of speaking SMTP.
///
/// Stands in wherever no outbound mail relay is configured; the scheduler's
/// bookkeeping (communication rows, audit entries) is identical either way.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), DispatchError> {
        tracing::info!(
            recipient = %message.recipient,
            subject = %message.subject,
            "mail delivery (log only)"
        );
        Ok(())
    }
}
