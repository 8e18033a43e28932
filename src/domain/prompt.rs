//! System prompt templating

use crate::domain::shared::error::DomainError;
use std::path::Path;
use tracing::{info, warn};

pub const PHONE_NUMBER_PLACEHOLDER: &str = "{phone_number}";
pub const CLIENT_NAME_PLACEHOLDER: &str = "{client_name}";

/// Prompt text with `{phone_number}` and `{client_name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Build a template, requiring both placeholders
    pub fn new(text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        for placeholder in [PHONE_NUMBER_PLACEHOLDER, CLIENT_NAME_PLACEHOLDER] {
            if !text.contains(placeholder) {
                return Err(DomainError::InvalidTemplate(format!(
                    "missing {} placeholder",
                    placeholder
                )));
            }
        }
        Ok(Self { text })
    }

    /// Extract the prompt body from a markdown document.
    ///
    /// When `heading` is present, only the text after the first line starting
    /// with it is kept; otherwise the whole document is used.
    pub fn from_markdown(content: &str, heading: Option<&str>) -> Result<Self, DomainError> {
        let body = heading
            .and_then(|heading| {
                let lines: Vec<&str> = content.lines().collect();
                lines
                    .iter()
                    .position(|line| line.starts_with(heading))
                    .map(|idx| lines[idx + 1..].join("\n"))
            })
            .unwrap_or_else(|| content.to_string());

        Self::new(body.trim())
    }

    pub fn render(&self, phone_number: &str, client_name: &str) -> String {
        self.text
            .replace(PHONE_NUMBER_PLACEHOLDER, phone_number)
            .replace(CLIENT_NAME_PLACEHOLDER, client_name)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Builds the agent's instruction text for a caller.
///
/// The template is loaded once; a missing or invalid template downgrades to
/// a fixed fallback instruction instead of failing the call.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    template: Option<PromptTemplate>,
    fallback_persona: String,
}

impl PromptComposer {
    pub fn new(template: Option<PromptTemplate>, fallback_persona: impl Into<String>) -> Self {
        Self {
            template,
            fallback_persona: fallback_persona.into(),
        }
    }

    /// Load a template from a markdown file. Read or validation failures are
    /// logged and leave the composer on the fallback text.
    pub fn load(path: &Path, heading: Option<&str>, fallback_persona: impl Into<String>) -> Self {
        info!("Loading prompt template from {}", path.display());

        let template = match std::fs::read_to_string(path) {
            Ok(content) => match PromptTemplate::from_markdown(&content, heading) {
                Ok(template) => Some(template),
                Err(e) => {
                    warn!("Prompt template {} rejected: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Could not read prompt template {}: {}", path.display(), e);
                None
            }
        };

        Self::new(template, fallback_persona)
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }

    pub fn compose(&self, phone_number: &str, client_name: &str) -> String {
        match &self.template {
            Some(template) => template.render(phone_number, client_name),
            None => {
                info!("Using fallback instructions for {}", phone_number);
                self.fallback(phone_number, client_name)
            }
        }
    }

    fn fallback(&self, phone_number: &str, client_name: &str) -> String {
        format!(
            "Номер телефона клиента: {}.\nИмя клиента: {}\n\n{}",
            phone_number, client_name, self.fallback_persona
        )
    }
}
