//! Carga y gestión de configuración de la aplicación (servidor + LLM + almacenamiento).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::identity::{IdGenerator, SequentialIds, ShortUuid};

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:3323";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DATA_DIR_NAME: &str = "jsx-fragment-studio";
const PROJECT_FILE_NAME: &str = "project.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Cómo se generan los ids de los elementos que no traen uno.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdStrategy {
    /// Tokens cortos derivados de UUID v4.
    Random,
    /// `prefijo-1`, `prefijo-2`, ... (reproducible).
    Sequential(String),
}

impl IdStrategy {
    pub fn generator(&self) -> Box<dyn IdGenerator + Send> {
        match self {
            IdStrategy::Random => Box::new(ShortUuid),
            IdStrategy::Sequential(prefix) => Box::new(SequentialIds::new(prefix.clone())),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    /// Modelo para las regeneraciones puntuales; por defecto el de chat.
    pub llm_patch_model: String,

    pub data_dir: PathBuf,
    pub preserve_style: bool,
    pub open_browser: bool,
    pub id_strategy: IdStrategy,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let llm_patch_model =
            env::var("LLM_PATCH_MODEL").unwrap_or_else(|_| llm_chat_model.clone());

        let data_dir = env::var("STUDIO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let preserve_style = match env::var("STUDIO_PRESERVE_STYLE") {
            Ok(value) => parse_flag(&value)?,
            Err(_) => true,
        };
        let open_browser = match env::var("STUDIO_OPEN_BROWSER") {
            Ok(value) => parse_flag(&value)?,
            Err(_) => true,
        };

        let id_strategy = match env::var("STUDIO_ID_PREFIX") {
            Ok(prefix) if !prefix.trim().is_empty() => IdStrategy::Sequential(prefix.trim().to_string()),
            _ => IdStrategy::Random,
        };

        Ok(Self {
            server_addr,
            llm_provider,
            llm_chat_model,
            llm_patch_model,
            data_dir,
            preserve_style,
            open_browser,
            id_strategy,
        })
    }

    /// Fichero del único proyecto persistido.
    pub fn project_file(&self) -> PathBuf {
        self.data_dir.join(PROJECT_FILE_NAME)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{DATA_DIR_NAME}")))
}

/// Interpreta `true/false`, `1/0`, `yes/no`, `on/off`, `si/no`.
pub fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "si" | "sí" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Valor booleano no válido: {other}")),
    }
}
