//! Default OTP message templates
//!
//! Templates use `{{name}}` placeholders. `code` is always available; the OTP
//! service also passes `expiry_minutes`, and callers may add their own.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::entities::OtpPurpose;
use crate::errors::{DomainError, DomainResult};
use crate::services::otp::MessageRenderer;

/// Key of the fallback template
pub const DEFAULT_TEMPLATE_KEY: &str = "default";

/// Built-in templates keyed by purpose
pub const DEFAULT_OTP_TEMPLATES: &[(&str, &str)] = &[
    (
        "login",
        "Your login code is {{code}}. Valid for {{expiry_minutes}} minutes. Don't share this code.",
    ),
    (
        "registration",
        "Welcome! Your verification code is {{code}}. Valid for {{expiry_minutes}} minutes.",
    ),
    (
        "password_reset",
        "Your password reset code is {{code}}. Valid for {{expiry_minutes}} minutes. If you didn't request this, ignore this message.",
    ),
    (
        "verification",
        "Your verification code is {{code}}. Valid for {{expiry_minutes}} minutes.",
    ),
    (
        "transaction",
        "Your transaction code is {{code}}. Valid for {{expiry_minutes}} minutes. Never share this code.",
    ),
    (
        "2fa",
        "Your two-factor authentication code is {{code}}. Valid for {{expiry_minutes}} minutes.",
    ),
    (
        DEFAULT_TEMPLATE_KEY,
        "Your verification code is {{code}}. Valid for {{expiry_minutes}} minutes.",
    ),
];

/// Read-only template table implementing [`MessageRenderer`]
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: HashMap<String, String>,
}

impl TemplateRenderer {
    /// Renderer preloaded with the built-in purpose templates
    pub fn with_defaults() -> Self {
        Self {
            templates: DEFAULT_OTP_TEMPLATES
                .iter()
                .map(|(key, content)| (key.to_string(), content.to_string()))
                .collect(),
        }
    }

    /// Renderer over an explicit table
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    /// Add or replace a template
    pub fn with_template(mut self, id: impl Into<String>, content: impl Into<String>) -> Self {
        self.templates.insert(id.into(), content.into());
        self
    }

    fn resolve<'a>(
        &'a self,
        template: Option<&'a str>,
        purpose: OtpPurpose,
    ) -> DomainResult<&'a str> {
        if let Some(template) = template {
            if let Some(content) = self.templates.get(template) {
                return Ok(content.as_str());
            }
            if template.contains("{{") {
                return Ok(template);
            }
            return Err(DomainError::Validation {
                message: format!("Unknown template: {}", template),
            });
        }

        self.templates
            .get(purpose.as_str())
            .or_else(|| self.templates.get(DEFAULT_TEMPLATE_KEY))
            .map(String::as_str)
            .ok_or_else(|| DomainError::Internal {
                message: format!("No template for purpose {}", purpose),
            })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl MessageRenderer for TemplateRenderer {
    async fn render(
        &self,
        template: Option<&str>,
        purpose: OtpPurpose,
        code: &str,
        variables: &HashMap<String, String>,
    ) -> DomainResult<String> {
        let content = self.resolve(template, purpose)?;
        Ok(substitute(content, |name| match name {
            "code" => Some(code),
            other => variables.get(other).map(String::as_str),
        }))
    }
}

/// Replace `{{ name }}` placeholders; unknown names are left as written
fn substitute<'a, F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut output = String::with_capacity(content.len() + 16);
    let mut rest = content;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let name = after_open[..end].trim();
                match lookup(name) {
                    Some(value) => output.push_str(value),
                    None => output.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after_open[end + 2..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}
