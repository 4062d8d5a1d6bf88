//! Interfaz de línea de comandos.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::{
    config::{AppConfig, IdStrategy},
    decompose::decompose,
    llm::LlmManager,
    sanitize::{PolicySanitizer, SanitizerConfig},
    store::{JsonFileStore, ProjectStore},
    studio::{StudioContext, StudioError},
};

#[derive(Parser, Debug)]
#[command(name = "jsx-fragment-studio")]
#[command(about = "Genera componentes JSX y los edita elemento a elemento")]
pub struct Cli {
    /// Directorio de datos
    #[arg(short, long, env = "STUDIO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Arranca el servidor web (por defecto)
    Serve,
    /// Genera un proyecto nuevo y reemplaza el actual
    Generate {
        prompt: String,
    },
    /// Modifica un elemento del proyecto actual
    Patch {
        /// data-id del elemento
        target: String,
        /// Instrucción para el modelo
        #[arg(short, long, required_unless_present = "content")]
        instruction: Option<String>,
        /// Marcado nuevo, sin pasar por el modelo
        #[arg(short, long, conflicts_with = "instruction")]
        content: Option<String>,
        /// No conservar clases ni estilos previos
        #[arg(long)]
        no_preserve_style: bool,
    },
    /// Descompone un fichero (o `-` para stdin) y muestra los fragmentos
    Decompose {
        file: PathBuf,
        /// Ids secuenciales con este prefijo
        #[arg(long)]
        id_prefix: Option<String>,
    },
    /// Muestra el proyecto actual
    Show {
        /// Sólo el documento ensamblado
        #[arg(long)]
        document: bool,
    },
    /// Borra el proyecto actual
    Clear,
}

/// Ejecuta un subcomando distinto de `serve` y devuelve lo que hay que
/// imprimir.
pub async fn execute(config: &AppConfig, command: Command) -> Result<String, StudioError> {
    let store = JsonFileStore::new(config.project_file());

    match command {
        Command::Serve => Err(StudioError::Internal(anyhow!(
            "`serve` se gestiona fuera de execute"
        ))),
        Command::Generate { prompt } => {
            let llm_manager = LlmManager::from_config(config)?;
            let sanitizer = sanitizer()?;
            let studio = context(config, &llm_manager, &sanitizer, config.preserve_style);

            let project = studio.generate_project(&prompt, Utc::now()).await?;
            store.save(&project).await?;
            Ok(summary(&project))
        }
        Command::Patch {
            target,
            instruction,
            content,
            no_preserve_style,
        } => {
            let project = load(&store).await?;
            let llm_manager = LlmManager::from_config(config)?;
            let sanitizer = sanitizer()?;
            let preserve_style = config.preserve_style && !no_preserve_style;
            let studio = context(config, &llm_manager, &sanitizer, preserve_style);
            let now = Utc::now();

            let next = match (content, instruction) {
                (Some(content), _) => studio.replace_element(&project, &target, &content, now)?,
                (None, Some(instruction)) => {
                    studio
                        .regenerate_element(&project, &target, &instruction, now)
                        .await?
                }
                (None, None) => {
                    return Err(StudioError::InvalidInput(
                        "se necesita --instruction o --content".to_string(),
                    ))
                }
            };
            store.save(&next).await?;
            Ok(summary(&next))
        }
        Command::Decompose { file, id_prefix } => {
            let raw = read_input(&file)?;
            let strategy = match id_prefix {
                Some(prefix) => IdStrategy::Sequential(prefix),
                None => config.id_strategy.clone(),
            };
            let mut ids = strategy.generator();
            let fragments = decompose(&raw, &mut *ids);
            Ok(serde_json::to_string_pretty(&fragments).context("serializando fragmentos")?)
        }
        Command::Show { document } => {
            let project = load(&store).await?;
            if document {
                Ok(project.assembled_content)
            } else {
                Ok(serde_json::to_string_pretty(&project).context("serializando proyecto")?)
            }
        }
        Command::Clear => {
            store.clear().await?;
            Ok("Proyecto borrado.".to_string())
        }
    }
}

fn context<'a>(
    config: &'a AppConfig,
    llm_manager: &'a LlmManager,
    sanitizer: &'a PolicySanitizer,
    preserve_style: bool,
) -> StudioContext<'a, LlmManager> {
    StudioContext {
        generator: llm_manager,
        sanitizer,
        generation_model: &llm_manager.chat_model,
        patch_model: &llm_manager.patch_model,
        preserve_style,
        id_strategy: &config.id_strategy,
    }
}

fn sanitizer() -> Result<PolicySanitizer, StudioError> {
    PolicySanitizer::new(&SanitizerConfig::default())
        .map_err(|e| StudioError::Internal(anyhow!("Política de saneado no válida: {e}")))
}

async fn load(store: &JsonFileStore) -> Result<crate::models::Project, StudioError> {
    store
        .load()
        .await?
        .ok_or_else(|| StudioError::NotFound("todavía no hay ningún proyecto".to_string()))
}

fn read_input(file: &Path) -> Result<String, StudioError> {
    if file.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("leyendo stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(file).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            StudioError::NotFound(format!("no existe el fichero {}", file.display()))
        }
        _ => StudioError::Internal(anyhow!("No se pudo leer {}: {}", file.display(), e)),
    })
}

fn summary(project: &crate::models::Project) -> String {
    let mut out = format!("{} ({})\n", project.title, project.id);
    for fragment in &project.fragments {
        out.push_str(&format!(
            "  {:<16} {:<12} {}\n",
            fragment.id, fragment.display_name, fragment.element_kind
        ));
    }
    if let Some(last) = project.history.last() {
        out.push_str(&format!("Último cambio: {}", last.description));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn config(dir: &tempfile::TempDir) -> AppConfig {
        AppConfig {
            server_addr: "127.0.0.1:0".into(),
            llm_provider: LlmProvider::OpenAI,
            llm_chat_model: "gpt-4o-mini".into(),
            llm_patch_model: "gpt-4o-mini".into(),
            data_dir: dir.path().to_path_buf(),
            preserve_style: true,
            open_browser: false,
            id_strategy: IdStrategy::Random,
        }
    }

    #[test]
    fn parses_patch_with_content() {
        let cli = Cli::parse_from([
            "jsx-fragment-studio",
            "patch",
            "title",
            "--content",
            "<h1 data-id=\"title\">x</h1>",
        ]);
        assert_eq!(
            cli.command,
            Some(Command::Patch {
                target: "title".into(),
                instruction: None,
                content: Some("<h1 data-id=\"title\">x</h1>".into()),
                no_preserve_style: false,
            })
        );
    }

    #[test]
    fn patch_requires_instruction_or_content() {
        assert!(Cli::try_parse_from(["jsx-fragment-studio", "patch", "title"]).is_err());
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["jsx-fragment-studio"]);
        assert!(cli.command.is_none());
    }

    #[tokio::test]
    async fn decompose_prints_fragments_with_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.jsx");
        std::fs::write(&file, "<div><p data-id=\"\">a</p><p>b</p></div>").unwrap();

        let out = execute(
            &config(&dir),
            Command::Decompose {
                file,
                id_prefix: Some("p".into()),
            },
        )
        .await
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json[0]["id"], "p-1");
    }

    #[tokio::test]
    async fn show_without_project_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(&config(&dir), Command::Show { document: false })
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn manual_patch_updates_stored_project() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let now = Utc::now();
        let project = crate::models::Project::create(
            "Demo",
            "demo",
            vec![crate::models::Fragment::new(
                "foot",
                "footer",
                r#"<footer data-id="foot">pie</footer>"#,
                now,
            )],
            "gpt-4o-mini",
            now,
        );
        JsonFileStore::new(config.project_file())
            .save(&project)
            .await
            .unwrap();

        execute(
            &config,
            Command::Patch {
                target: "foot".into(),
                instruction: None,
                content: Some(r#"<footer data-id="foot">nuevo</footer>"#.into()),
                no_preserve_style: false,
            },
        )
        .await
        .unwrap();

        let document = execute(&config, Command::Show { document: true })
            .await
            .unwrap();
        assert!(document.contains(r#"<footer data-id="foot">nuevo</footer>"#));
    }
}
