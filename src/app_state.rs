use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::oneshot;

use crate::{
    config::AppConfig,
    llm::LlmManager,
    sanitize::{PolicySanitizer, SanitizerConfig},
    store::JsonFileStore,
    studio::StudioContext,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: LlmManager,
    pub sanitizer: Arc<PolicySanitizer>,
    pub store: Arc<JsonFileStore>,
    pub status: Arc<Mutex<Status>>,
    /// Serializa cada ciclo cargar-modificar-guardar del proyecto.
    pub edit_lock: Arc<tokio::sync::Mutex<()>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl AppState {
    pub fn new(config: AppConfig, shutdown_sender: Option<oneshot::Sender<()>>) -> Result<Self> {
        let llm_manager = LlmManager::from_config(&config)?;
        let sanitizer = PolicySanitizer::new(&SanitizerConfig::default())
            .map_err(|e| anyhow!("Política de saneado no válida: {e}"))?;
        let store = JsonFileStore::new(config.project_file());

        Ok(Self {
            config,
            llm_manager,
            sanitizer: Arc::new(sanitizer),
            store: Arc::new(store),
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
                progress: 0.0,
            })),
            edit_lock: Arc::new(tokio::sync::Mutex::new(())),
            shutdown_sender: Arc::new(Mutex::new(shutdown_sender)),
        })
    }

    /// Contexto del estudio con los colaboradores del servidor.
    pub fn studio(&self, preserve_style: Option<bool>) -> StudioContext<'_, LlmManager> {
        StudioContext {
            generator: &self.llm_manager,
            sanitizer: self.sanitizer.as_ref(),
            generation_model: &self.llm_manager.chat_model,
            patch_model: &self.llm_manager.patch_model,
            preserve_style: preserve_style.unwrap_or(self.config.preserve_style),
            id_strategy: &self.config.id_strategy,
        }
    }

    pub fn set_status(&self, is_busy: bool, message: impl Into<String>, progress: f32) {
        if let Ok(mut status) = self.status.lock() {
            status.is_busy = is_busy;
            status.message = message.into();
            status.progress = progress;
        }
    }

    pub fn status_snapshot(&self) -> Status {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default()
    }
}
