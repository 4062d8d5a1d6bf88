//! Casos de uso del estudio: generar un proyecto y regenerar un elemento.
//!
//! Aquí se cose el núcleo (descomposición, parche, ensamblado) con los
//! colaboradores externos: el modelo, el saneador y la marca de tiempo. La
//! persistencia queda fuera; quien llama decide cuándo guardar.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    assemble::verify_assembled,
    config::IdStrategy,
    decompose::decompose,
    llm::{ContentGenerator, GenerationReply},
    models::{ChangeRecord, Project},
    normalize::normalize,
    parser::extract_working_markup,
    patch::{apply_patch, find_owner, PatchError, PatchRequest},
    prompts::{generation_messages, patch_messages},
    sanitize::Sanitizer,
    splice::{locate, SpliceError},
};

const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("no encontrado: {0}")]
    NotFound(String),
    #[error("entrada no válida: {0}")]
    InvalidInput(String),
    #[error("el servicio de generación falló: {0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StudioError {
    /// Código de salida del CLI para cada tipo de error.
    pub fn exit_code(&self) -> i32 {
        match self {
            StudioError::NotFound(_) => 2,
            StudioError::InvalidInput(_) => 3,
            StudioError::Upstream(_) => 4,
            StudioError::Internal(_) => 1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StudioError::NotFound(_) => "not-found",
            StudioError::InvalidInput(_) => "invalid-input",
            StudioError::Upstream(_) => "upstream-failure",
            StudioError::Internal(_) => "internal-failure",
        }
    }
}

impl From<PatchError> for StudioError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::TargetNotFound(_) => StudioError::NotFound(err.to_string()),
            PatchError::IdentityNotPreserved(_) => StudioError::InvalidInput(err.to_string()),
            PatchError::Splice {
                source: SpliceError::EmptyReplacement,
                ..
            } => StudioError::InvalidInput(err.to_string()),
            other => StudioError::Internal(anyhow!(other)),
        }
    }
}

/// Colaboradores y opciones de una operación del estudio.
pub struct StudioContext<'a, G: ContentGenerator> {
    pub generator: &'a G,
    pub sanitizer: &'a dyn Sanitizer,
    pub generation_model: &'a str,
    pub patch_model: &'a str,
    pub preserve_style: bool,
    pub id_strategy: &'a IdStrategy,
}

impl<'a, G: ContentGenerator> StudioContext<'a, G> {
    /// Genera un proyecto nuevo a partir de la petición del usuario.
    pub async fn generate_project(
        &self,
        prompt: &str,
        now: DateTime<Utc>,
    ) -> Result<Project, StudioError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StudioError::InvalidInput("la petición está vacía".into()));
        }

        let raw = self
            .generator
            .complete(self.generation_model, &generation_messages(prompt))
            .await
            .map_err(|e| StudioError::Upstream(e.to_string()))?;
        let markup = expect_markup(raw)?;
        let sanitized = self.sanitizer.sanitize(&markup);

        let fragments = {
            let mut ids = self.id_strategy.generator();
            decompose(&sanitized, &mut *ids)
        };

        let project = Project::create(
            derive_title(prompt),
            prompt,
            fragments,
            self.generation_model,
            now,
        );
        verify_assembled(&project.assembled_content).map_err(PatchError::from)?;

        info!(
            "Proyecto {} generado con {} fragmentos",
            project.id,
            project.fragments.len()
        );
        Ok(project)
    }

    /// Regenera un elemento con el modelo y lo sustituye en el proyecto.
    ///
    /// Devuelve la nueva versión del proyecto; `project` no cambia.
    pub async fn regenerate_element(
        &self,
        project: &Project,
        target_id: &str,
        instruction: &str,
        now: DateTime<Utc>,
    ) -> Result<Project, StudioError> {
        let target_id = target_id.trim();
        let instruction = instruction.trim();
        if target_id.is_empty() {
            return Err(StudioError::InvalidInput("falta el data-id objetivo".into()));
        }
        if instruction.is_empty() {
            return Err(StudioError::InvalidInput("la instrucción está vacía".into()));
        }

        let current = current_markup(project, target_id)?;
        let raw = self
            .generator
            .complete(
                self.patch_model,
                &patch_messages(&current, target_id, instruction),
            )
            .await
            .map_err(|e| StudioError::Upstream(e.to_string()))?;
        let markup = expect_markup(raw)?;

        let normalized = normalize(&markup);
        let working =
            extract_working_markup(&normalized).unwrap_or_else(|| normalized.trim().to_string());

        let description = format!("data-id=\"{target_id}\": {instruction}");
        self.apply(project, target_id, &working, description, self.patch_model, now)
    }

    /// Sustituye un elemento por contenido ya escrito, sin pasar por el modelo.
    pub fn replace_element(
        &self,
        project: &Project,
        target_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Project, StudioError> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(StudioError::InvalidInput("falta el data-id objetivo".into()));
        }
        let description = format!("data-id=\"{target_id}\": edición manual");
        self.apply(project, target_id, &normalize(content), description, "manual", now)
    }

    fn apply(
        &self,
        project: &Project,
        target_id: &str,
        content: &str,
        description: String,
        model_used: &str,
        now: DateTime<Utc>,
    ) -> Result<Project, StudioError> {
        let request = PatchRequest {
            target_id: target_id.to_string(),
            content: self.sanitizer.sanitize(content),
            preserve_style: self.preserve_style,
        };
        let outcome = apply_patch(&project.fragments, &request, now).map_err(|err| {
            warn!("Parche rechazado sobre data-id=\"{}\": {}", target_id, err);
            StudioError::from(err)
        })?;

        let change = ChangeRecord::new(description, model_used, now);
        Ok(project.with_patch(outcome, change))
    }
}

/// Marcado actual del elemento objetivo dentro de su fragmento.
pub fn current_markup(project: &Project, target_id: &str) -> Result<String, StudioError> {
    let owner = find_owner(&project.fragments, target_id)
        .ok_or_else(|| PatchError::TargetNotFound(target_id.to_string()))?;
    locate(&owner.content, target_id).map_err(|err| match err {
        SpliceError::NotFound(id) => StudioError::from(PatchError::TargetNotFound(id)),
        other => StudioError::Internal(anyhow!(
            "el fragmento {} no se puede interpretar: {}",
            owner.id,
            other
        )),
    })
}

fn expect_markup(raw: String) -> Result<String, StudioError> {
    match GenerationReply::from_raw(raw) {
        GenerationReply::Markup(markup) => Ok(markup),
        GenerationReply::UpstreamError(message) => {
            warn!("El servicio de generación devolvió un error: {}", message);
            Err(StudioError::Upstream(message))
        }
    }
}

/// Primera línea de la petición, recortada.
pub fn derive_title(prompt: &str) -> String {
    let line = prompt.lines().next().unwrap_or("").trim();
    let mut title: String = line.chars().take(MAX_TITLE_CHARS).collect();
    if line.chars().count() > MAX_TITLE_CHARS {
        title.push('…');
    }
    if title.is_empty() {
        "Proyecto sin título".to_string()
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessagePart;
    use crate::sanitize::{PolicySanitizer, SanitizerConfig};
    use anyhow::Result;
    use std::sync::Mutex;

    /// Generador que devuelve respuestas fijas y guarda los mensajes recibidos.
    struct Scripted {
        reply: String,
        seen: Mutex<Vec<Vec<MessagePart>>>,
    }

    impl Scripted {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ContentGenerator for Scripted {
        async fn complete(&self, _model: &str, parts: &[MessagePart]) -> Result<String> {
            self.seen.lock().unwrap().push(parts.to_vec());
            Ok(self.reply.clone())
        }
    }

    const PAGE: &str = r#"```jsx
import React from 'react';
function Page() {
  return (
    <div>
      <section data-id="hero" className="p-8"><h1 data-id="title">Hola</h1></section>
      <footer data-id="foot">pie</footer>
    </div>
  );
}
```"#;

    fn context<'a>(
        generator: &'a Scripted,
        sanitizer: &'a PolicySanitizer,
        ids: &'a IdStrategy,
    ) -> StudioContext<'a, Scripted> {
        StudioContext {
            generator,
            sanitizer,
            generation_model: "gen-model",
            patch_model: "patch-model",
            preserve_style: true,
            id_strategy: ids,
        }
    }

    fn sanitizer() -> PolicySanitizer {
        PolicySanitizer::new(&SanitizerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn generates_project_from_model_output() {
        let generator = Scripted::new(PAGE);
        let sanitizer = sanitizer();
        let ids = IdStrategy::Sequential("t".into());
        let project = context(&generator, &sanitizer, &ids)
            .generate_project("  Una landing\ncon hero ", Utc::now())
            .await
            .unwrap();

        assert_eq!(project.title, "Una landing");
        let ids: Vec<&str> = project.fragments.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["hero", "foot"]);
        assert_eq!(project.history[0].model_used, "gen-model");
        assert!(project.assembled_content.contains(r#"data-assembly-root="true""#));
    }

    #[tokio::test]
    async fn upstream_sentinel_becomes_upstream_error() {
        let generator = Scripted::new(r#"{"error": "cuota agotada"}"#);
        let sanitizer = sanitizer();
        let ids = IdStrategy::Random;
        let err = context(&generator, &sanitizer, &ids)
            .generate_project("algo", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Upstream(ref m) if m == "cuota agotada"));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn empty_prompt_is_invalid_input() {
        let generator = Scripted::new(PAGE);
        let sanitizer = sanitizer();
        let ids = IdStrategy::Random;
        let err = context(&generator, &sanitizer, &ids)
            .generate_project("   ", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn regenerating_nested_element_touches_only_its_fragment() {
        let sanitizer = sanitizer();
        let ids = IdStrategy::Sequential("t".into());
        let project = context(&Scripted::new(PAGE), &sanitizer, &ids)
            .generate_project("landing", Utc::now())
            .await
            .unwrap();

        let generator = Scripted::new(
            "```jsx\n<h1 data-id=\"title\" className=\"text-4xl\">Bienvenido</h1>\n```",
        );
        let next = context(&generator, &sanitizer, &ids)
            .regenerate_element(&project, "title", "más grande", Utc::now())
            .await
            .unwrap();

        assert_eq!(
            next.fragments[0].content,
            r#"<section data-id="hero" className="p-8"><h1 data-id="title" className="text-4xl">Bienvenido</h1></section>"#
        );
        assert_eq!(next.fragments[1], project.fragments[1]);
        assert_eq!(next.history.len(), 2);
        assert_eq!(next.history[1].model_used, "patch-model");

        let seen = generator.seen.lock().unwrap();
        assert!(seen[0][1].content.contains(r#"<h1 data-id="title">Hola</h1>"#));
    }

    #[tokio::test]
    async fn regeneration_losing_identity_is_rejected() {
        let sanitizer = sanitizer();
        let ids = IdStrategy::Random;
        let project = context(&Scripted::new(PAGE), &sanitizer, &ids)
            .generate_project("landing", Utc::now())
            .await
            .unwrap();

        let err = context(&Scripted::new("<h1>sin id</h1>"), &sanitizer, &ids)
            .regenerate_element(&project, "title", "cambia", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found_before_calling_model() {
        let sanitizer = sanitizer();
        let ids = IdStrategy::Random;
        let project = context(&Scripted::new(PAGE), &sanitizer, &ids)
            .generate_project("landing", Utc::now())
            .await
            .unwrap();

        let generator = Scripted::new("<b data-id=\"nope\" />");
        let err = context(&generator, &sanitizer, &ids)
            .regenerate_element(&project, "nope", "x", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn manual_replacement_is_sanitized() {
        let sanitizer = sanitizer();
        let ids = IdStrategy::Random;
        let generator = Scripted::new("");
        let ctx = context(&generator, &sanitizer, &ids);
        let now = Utc::now();
        let project = Project::create(
            "Demo",
            "demo",
            vec![crate::models::Fragment::new(
                "foot",
                "footer",
                r#"<footer data-id="foot">pie</footer>"#,
                now,
            )],
            "gen-model",
            now,
        );

        let next = ctx
            .replace_element(
                &project,
                "foot",
                r#"<footer data-id="foot"><script>x()</script>nuevo</footer>"#,
                now,
            )
            .unwrap();
        assert_eq!(next.fragments[0].content, r#"<footer data-id="foot">nuevo</footer>"#);
        assert_eq!(next.history[1].model_used, "manual");
    }

    #[test]
    fn current_markup_skips_fragments_that_only_mention_the_id() {
        let now = Utc::now();
        let project = Project::create(
            "Demo",
            "demo",
            vec![
                crate::models::Fragment::new(
                    "doc",
                    "pre",
                    r#"<pre data-id="doc">usa data-id="q" para marcarlo</pre>"#,
                    now,
                ),
                crate::models::Fragment::new(
                    "card",
                    "div",
                    r#"<div data-id="card"><b data-id="q">x</b></div>"#,
                    now,
                ),
            ],
            "gen-model",
            now,
        );
        assert_eq!(
            current_markup(&project, "q").unwrap(),
            r#"<b data-id="q">x</b>"#
        );
    }

    #[test]
    fn long_titles_are_truncated() {
        let title = derive_title(&"a".repeat(80));
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS + 1);
        assert_eq!(derive_title(" \n"), "Proyecto sin título");
    }
}
