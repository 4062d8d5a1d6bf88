use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    models::{Fragment, Project},
    store::ProjectStore,
    studio::StudioError,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads ---

#[derive(Deserialize)]
pub struct GeneratePayload {
    prompt: String,
}

/// Con `content` se sustituye el elemento tal cual; si no, se regenera con
/// el modelo a partir de `instruction`.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchPayload {
    target_id: String,
    instruction: Option<String>,
    content: Option<String>,
    preserve_style: Option<bool>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate_handler))
        .route("/api/patch", post(patch_handler))
        .route(
            "/api/project",
            get(project_handler).delete(clear_project_handler),
        )
        .route("/api/project/document", get(document_handler))
        .route("/api/project/fragments/:id", get(fragment_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn generate_handler(
    State(state): State<AppState>,
    Json(payload): Json<GeneratePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.edit_lock.lock().await;
    state.set_status(true, "Generando componente...", 0.1);

    let result = state
        .studio(None)
        .generate_project(&payload.prompt, Utc::now())
        .await;
    let project = match result {
        Ok(project) => project,
        Err(err) => {
            state.set_status(false, format!("Error en la generación: {}", err), 0.0);
            return Err(studio_error(err));
        }
    };

    state.set_status(true, "Guardando proyecto...", 0.9);
    state.store.save(&project).await.map_err(internal_error)?;
    state.set_status(
        false,
        format!("Proyecto generado con {} fragmentos.", project.fragments.len()),
        0.0,
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[axum::debug_handler]
async fn patch_handler(
    State(state): State<AppState>,
    Json(payload): Json<PatchPayload>,
) -> Result<Json<Project>, ApiError> {
    let _guard = state.edit_lock.lock().await;
    let project = load_project(&state).await?;
    let studio = state.studio(payload.preserve_style);
    let now = Utc::now();

    let result = match (&payload.content, &payload.instruction) {
        (Some(content), _) => studio.replace_element(&project, &payload.target_id, content, now),
        (None, Some(instruction)) => {
            state.set_status(true, format!("Regenerando {}...", payload.target_id), 0.3);
            let result = studio
                .regenerate_element(&project, &payload.target_id, instruction, now)
                .await;
            state.set_status(false, "Servidor listo.", 0.0);
            result
        }
        (None, None) => Err(StudioError::InvalidInput(
            "se necesita 'instruction' o 'content'".to_string(),
        )),
    };
    let next = result.map_err(studio_error)?;

    state.store.save(&next).await.map_err(internal_error)?;
    Ok(Json(next))
}

#[axum::debug_handler]
async fn project_handler(State(state): State<AppState>) -> Result<Json<Project>, ApiError> {
    Ok(Json(load_project(&state).await?))
}

#[axum::debug_handler]
async fn clear_project_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let _guard = state.edit_lock.lock().await;
    state.store.clear().await.map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn document_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let project = load_project(&state).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        project.assembled_content,
    ))
}

#[axum::debug_handler]
async fn fragment_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Fragment>, ApiError> {
    let project = load_project(&state).await?;
    match project.fragment(&id) {
        Some(fragment) => Ok(Json(fragment.clone())),
        None => Err(studio_error(StudioError::NotFound(format!(
            "no existe el fragmento {}",
            id
        )))),
    }
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status_snapshot())
}

// --- Handler de Apagado y Utilidades ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Ok(mut sender) = state.shutdown_sender.lock() {
        if let Some(sender) = sender.take() {
            let _ = sender.send(());
        }
    }
    StatusCode::OK
}

async fn load_project(state: &AppState) -> Result<Project, ApiError> {
    match state.store.load().await {
        Ok(Some(project)) => Ok(project),
        Ok(None) => Err(studio_error(StudioError::NotFound(
            "todavía no hay ningún proyecto".to_string(),
        ))),
        Err(e) => Err(internal_error(e)),
    }
}

fn studio_error(err: StudioError) -> ApiError {
    let status = match err {
        StudioError::NotFound(_) => StatusCode::NOT_FOUND,
        StudioError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StudioError::Upstream(_) => StatusCode::BAD_GATEWAY,
        StudioError::Internal(ref e) => {
            error!("Error interno: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(json!({ "error": err.to_string(), "kind": err.kind() })),
    )
}

fn internal_error(err: anyhow::Error) -> ApiError {
    studio_error(StudioError::Internal(err))
}
