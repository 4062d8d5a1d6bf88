//! Modelos de dominio: fragmentos, proyectos e historial de cambios.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{assemble::assemble, patch::PatchOutcome};

/// Nombre fijo del fragmento sintetizado cuando no hay elementos identificados.
pub const ROOT_CONTAINER_NAME: &str = "RootContainer";

/// Subárbol del documento editable de forma independiente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub id: String,
    pub display_name: String,
    /// Marcado serializado del subárbol completo; se puede volver a parsear.
    pub content: String,
    /// Etiqueta raíz de `content`, en minúsculas.
    pub element_kind: String,
    pub last_modified_at: DateTime<Utc>,
}

impl Fragment {
    pub fn new(
        id: impl Into<String>,
        tag: &str,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name_for(tag),
            content: content.into(),
            element_kind: tag.to_ascii_lowercase(),
            last_modified_at: now,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Recalcula `element_kind` y `display_name` a partir de la etiqueta raíz.
    pub fn with_element_kind(mut self, tag: &str) -> Self {
        self.element_kind = tag.to_ascii_lowercase();
        self.display_name = display_name_for(tag);
        self
    }

    /// Copia del fragmento con contenido nuevo y la marca de tiempo refrescada.
    pub fn with_content(&self, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            last_modified_at: now,
            ..self.clone()
        }
    }
}

/// Etiqueta con la primera letra en mayúscula (`section` → `Section`).
pub fn display_name_for(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Fragment".to_string(),
    }
}

/// Entrada del historial. Se escribe una vez y no se modifica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub model_used: String,
    pub change_id: String,
}

impl ChangeRecord {
    pub fn new(
        description: impl Into<String>,
        model_used: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: now,
            description: description.into(),
            model_used: model_used.into(),
            change_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Ready,
    Archived,
}

/// Agregado raíz: posee sus fragmentos y su historial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub initial_prompt: String,
    /// El orden importa: es el orden de reensamblado.
    pub fragments: Vec<Fragment>,
    pub assembled_content: String,
    pub history: Vec<ChangeRecord>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Crea el proyecto a partir de la primera descomposición.
    pub fn create(
        title: impl Into<String>,
        initial_prompt: impl Into<String>,
        fragments: Vec<Fragment>,
        model_used: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let assembled_content = assemble(&fragments);
        let history = vec![ChangeRecord::new(
            format!("Generación inicial ({} fragmentos)", fragments.len()),
            model_used,
            now,
        )];
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            initial_prompt: initial_prompt.into(),
            fragments,
            assembled_content,
            history,
            status: ProjectStatus::Draft,
            created_at: now,
        }
    }

    pub fn fragment(&self, id: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id == id)
    }

    /// Siguiente versión del proyecto tras un parche aplicado.
    ///
    /// El proyecto original no se modifica.
    pub fn with_patch(&self, outcome: PatchOutcome, change: ChangeRecord) -> Project {
        let mut history = self.history.clone();
        history.push(change);
        Project {
            fragments: outcome.fragments,
            assembled_content: outcome.assembled_content,
            history,
            status: ProjectStatus::Ready,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_capitalizes_first_letter() {
        assert_eq!(display_name_for("section"), "Section");
        assert_eq!(display_name_for("Hero"), "Hero");
        assert_eq!(display_name_for(""), "Fragment");
    }

    #[test]
    fn fragment_serializes_in_camel_case() {
        let now = Utc::now();
        let fragment = Fragment::new("a1", "DIV", "<DIV data-id=\"a1\"></DIV>", now);
        assert_eq!(fragment.element_kind, "div");
        assert_eq!(fragment.display_name, "DIV");

        let json = serde_json::to_value(&fragment).unwrap();
        assert_eq!(json["elementKind"], "div");
        assert!(json.get("lastModifiedAt").is_some());
    }

    #[test]
    fn element_kind_follows_new_root_tag() {
        let fragment = Fragment::new("b", "p", "<p data-id=\"b\">x</p>", Utc::now())
            .with_element_kind("Section");
        assert_eq!(fragment.element_kind, "section");
        assert_eq!(fragment.display_name, "Section");
    }

    #[test]
    fn create_assembles_and_records_history() {
        let now = Utc::now();
        let fragments = vec![Fragment::new("x", "div", "<div data-id=\"x\">A</div>", now)];
        let project = Project::create("Demo", "haz algo", fragments, "gpt-4o-mini", now);

        assert_eq!(project.status, ProjectStatus::Draft);
        assert_eq!(project.history.len(), 1);
        assert!(project.assembled_content.contains("<div data-id=\"x\">A</div>"));
        assert_eq!(project.fragment("x").map(|f| f.element_kind.as_str()), Some("div"));
    }
}
