//! Abstracción sobre Rig para generar marcado con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use std::future::Future;

use anyhow::{anyhow, Result};
use rig::completion::Prompt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{AppConfig, LlmProvider};

/// Rol de cada parte del mensaje enviado al modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub role: Role,
    pub content: String,
}

impl MessagePart {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Respuesta del servicio de generación, ya clasificada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationReply {
    Markup(String),
    /// El centinela `{"error": "..."}`.
    UpstreamError(String),
}

#[derive(Deserialize)]
struct ErrorSentinel {
    error: String,
}

impl GenerationReply {
    /// Comprueba el centinela de error antes de tratar el texto como marcado.
    pub fn from_raw(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            if let Ok(sentinel) = serde_json::from_str::<ErrorSentinel>(trimmed) {
                return Self::UpstreamError(sentinel.error);
            }
        }
        Self::Markup(raw)
    }

    /// Construye el centinela a partir de un mensaje.
    pub fn sentinel(message: &str) -> String {
        json!({ "error": message }).to_string()
    }
}

/// Servicio externo que produce texto a partir de mensajes con rol.
pub trait ContentGenerator: Send + Sync {
    fn complete(
        &self,
        model: &str,
        parts: &[MessagePart],
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Gestor de LLMs.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
    pub patch_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            patch_model: cfg.llm_patch_model.clone(),
        })
    }

    async fn complete_with_openai(&self, model: &str, parts: &[MessagePart]) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        // Modelo por defecto si no se ha configurado otro
        let model_name = if model.is_empty() {
            self.chat_model.as_str()
        } else {
            model
        };

        let preamble = parts
            .iter()
            .filter(|p| p.role == Role::System)
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        // La última parte del usuario es el prompt; el resto va como contexto.
        let prompt_index = parts.iter().rposition(|p| p.role == Role::User);
        let prompt = match prompt_index {
            Some(idx) => parts[idx].content.clone(),
            None => return Err(anyhow!("No hay ningún mensaje de usuario que enviar al modelo")),
        };

        let mut builder = client.agent(model_name).preamble(&preamble);
        for (idx, part) in parts.iter().enumerate() {
            if part.role != Role::System && Some(idx) != prompt_index {
                builder = builder.context(&part.content);
            }
        }
        let agent = builder.build();

        info!("Solicitando generación a {} ({} partes)", model_name, parts.len());
        match agent.prompt(prompt.as_str()).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!("El modelo {} devolvió un error: {}", model_name, e);
                Ok(GenerationReply::sentinel(&e.to_string()))
            }
        }
    }
}

impl ContentGenerator for LlmManager {
    async fn complete(&self, model: &str, parts: &[MessagePart]) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(model, parts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para generación",
                other
            )),
        }
    }
}
