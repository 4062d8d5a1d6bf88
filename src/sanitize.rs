//! Saneado del marcado generado según una política configurable.
//!
//! La política (qué se permite y qué no) es configuración; aquí sólo está el
//! mecanismo: quitar etiquetas y atributos prohibidos. El atributo de
//! identidad tiene que sobrevivir siempre.

use regex::Regex;
use tracing::debug;

use crate::identity::IDENTITY_ATTR;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    #[error("la política de saneado eliminaría el atributo de identidad data-id")]
    IdentityNotAllowed,
    #[error("patrón de saneado no válido: {0}")]
    InvalidPattern(String),
}

/// Configuración de la política de saneado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerConfig {
    /// Etiquetas permitidas aunque aparezcan en `forbidden_tags`.
    pub allowed_tags: Vec<String>,
    /// Atributos permitidos aunque aparezcan en `forbidden_attributes`.
    pub allowed_attributes: Vec<String>,
    pub forbidden_tags: Vec<String>,
    pub forbidden_attributes: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            allowed_tags: Vec::new(),
            allowed_attributes: owned(&[IDENTITY_ATTR, "className", "class", "style"]),
            forbidden_tags: owned(&["script", "iframe", "object", "embed", "base", "frame"]),
            forbidden_attributes: owned(&["dangerouslySetInnerHTML", "srcdoc", "formaction"]),
        }
    }
}

impl SanitizerConfig {
    /// El atributo de identidad debe figurar entre los permitidos.
    pub fn validate(&self) -> Result<(), SanitizeError> {
        let allowed = self.allowed_attributes.iter().any(|a| a == IDENTITY_ATTR);
        if !allowed {
            return Err(SanitizeError::IdentityNotAllowed);
        }
        Ok(())
    }

    fn effective_forbidden_tags(&self) -> Vec<&str> {
        self.forbidden_tags
            .iter()
            .filter(|t| !self.allowed_tags.iter().any(|a| a.eq_ignore_ascii_case(t)))
            .map(String::as_str)
            .collect()
    }

    fn effective_forbidden_attributes(&self) -> Vec<&str> {
        self.forbidden_attributes
            .iter()
            .filter(|t| !self.allowed_attributes.iter().any(|a| a == *t))
            .map(String::as_str)
            .collect()
    }
}

/// Servicio de saneado.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, markup: &str) -> String;
}

/// Saneador basado en expresiones regulares compiladas desde la política.
#[derive(Debug)]
pub struct PolicySanitizer {
    paired_tags: Vec<Regex>,
    lone_tags: Vec<Regex>,
    attributes: Option<Regex>,
}

impl PolicySanitizer {
    pub fn new(config: &SanitizerConfig) -> Result<Self, SanitizeError> {
        config.validate()?;

        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| SanitizeError::InvalidPattern(e.to_string()))
        };

        let mut paired_tags = Vec::new();
        let mut lone_tags = Vec::new();
        for tag in config.effective_forbidden_tags() {
            let tag = regex::escape(tag);
            paired_tags.push(compile(format!(
                r"(?is)<\s*{tag}\b(?:[^>]*[^/>])?>.*?<\s*/\s*{tag}\s*>"
            ))?);
            lone_tags.push(compile(format!(r"(?i)<\s*/?\s*{tag}\b[^>]*>"))?);
        }

        let names = config
            .effective_forbidden_attributes()
            .into_iter()
            .map(regex::escape)
            .collect::<Vec<_>>();
        let attributes = if names.is_empty() {
            None
        } else {
            Some(compile(format!(
                r#"(?i)\s+(?:{})\s*=\s*(?:"[^"]*"|'[^']*'|\{{(?:[^{{}}]|\{{[^{{}}]*\}})*\}}|[^\s/>]+)"#,
                names.join("|")
            ))?)
        };

        Ok(Self {
            paired_tags,
            lone_tags,
            attributes,
        })
    }
}

impl Sanitizer for PolicySanitizer {
    fn sanitize(&self, markup: &str) -> String {
        let mut out = markup.to_string();
        for regex in &self.paired_tags {
            out = regex.replace_all(&out, "").into_owned();
        }
        for regex in &self.lone_tags {
            out = regex.replace_all(&out, "").into_owned();
        }
        if let Some(regex) = &self.attributes {
            out = regex.replace_all(&out, "").into_owned();
        }

        if out.len() != markup.len() {
            debug!(
                "Saneado eliminó {} caracteres",
                markup.len().saturating_sub(out.len())
            );
        }
        out
    }
}
