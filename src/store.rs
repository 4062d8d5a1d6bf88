//! Persistencia del proyecto actual (una única ranura, sin versionado).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::models::Project;

pub trait ProjectStore: Send + Sync {
    fn save(&self, project: &Project) -> impl Future<Output = Result<()>> + Send;
    fn load(&self) -> impl Future<Output = Result<Option<Project>>> + Send;
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Guarda el proyecto como JSON en un fichero.
///
/// Se escribe primero a un temporal y luego se renombra, para que una
/// escritura interrumpida no deje el proyecto a medias.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProjectStore for JsonFileStore {
    async fn save(&self, project: &Project) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("No se pudo crear el directorio {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(project)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("No se pudo escribir {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("No se pudo reemplazar {}", self.path.display()))?;

        info!("Proyecto {} guardado en {}", project.id, self.path.display());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Project>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow!("No se pudo leer {}: {}", self.path.display(), e));
            }
        };
        let project = serde_json::from_str(&raw)
            .with_context(|| format!("Proyecto corrupto en {}", self.path.display()))?;
        Ok(Some(project))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Proyecto eliminado de {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!("No se pudo borrar {}: {}", self.path.display(), e)),
        }
    }
}

/// Almacén en memoria.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectStore for MemoryStore {
    async fn save(&self, project: &Project) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("MemoryStore envenenado"))?;
        *slot = Some(project.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Project>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("MemoryStore envenenado"))?;
        Ok(slot.clone())
    }

    async fn clear(&self) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("MemoryStore envenenado"))?;
        *slot = None;
        Ok(())
    }
}
