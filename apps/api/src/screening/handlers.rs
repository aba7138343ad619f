//! Axum route handlers for the pre-screening editor.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::backend_client::NewQuestion;
use crate::errors::AppError;
use crate::models::prescreening::{Channels, PublishRecord};
use crate::models::question::QuestionType;
use crate::screening::editor::{EditorView, MessagesPatch};
use crate::screening::generation::RegenerationOutcome;
use crate::screening::mutations::MutationOutcome;
use crate::screening::publish::StatusChange;
use crate::screening::unsaved::LeaveDecision;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub knockout: Vec<String>,
    pub qualifying: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddQuestionRequest {
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub ideal_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub online: bool,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaveRequest {
    #[serde(default)]
    pub confirmed: bool,
}

/// Result of an engine operation together with the state it left behind.
#[derive(Debug, Serialize)]
pub struct OperationResponse<T> {
    pub result: T,
    pub view: EditorView,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub decision: LeaveDecision,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/vacancies/:vacancy_id/prescreening
pub async fn handle_get_prescreening(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
) -> Result<Json<EditorView>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    Ok(Json(editor.view()))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/generate
///
/// Streams progress into the editor while generating; exhausted retries come back as a
/// `failed` outcome rather than an error status.
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<OperationResponse<RegenerationOutcome>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor.generate(request.description.as_deref()).await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/feedback
pub async fn handle_feedback(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<OperationResponse<RegenerationOutcome>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor.send_feedback(&request.message).await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// PUT /api/v1/vacancies/:vacancy_id/prescreening/questions/order
pub async fn handle_reorder(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<OperationResponse<MutationOutcome>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor.reorder(request.knockout, request.qualifying).await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/questions
pub async fn handle_add_question(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(request): Json<AddQuestionRequest>,
) -> Result<Json<OperationResponse<MutationOutcome>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor
        .add_question(NewQuestion {
            question_type: request.question_type,
            text: request.text.trim().to_string(),
            ideal_answer: request.ideal_answer,
        })
        .await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// DELETE /api/v1/vacancies/:vacancy_id/prescreening/questions/:question_id
pub async fn handle_delete_question(
    State(state): State<AppState>,
    Path((vacancy_id, question_id)): Path<(String, String)>,
) -> Result<Json<OperationResponse<MutationOutcome>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor.delete_question(&question_id).await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// PUT /api/v1/vacancies/:vacancy_id/prescreening/messages
pub async fn handle_update_messages(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(patch): Json<MessagesPatch>,
) -> Result<Json<EditorView>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    editor.update_messages(patch)?;
    Ok(Json(editor.view()))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/save
pub async fn handle_save(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
) -> Result<Json<EditorView>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    editor.save_now().await?;
    Ok(Json(editor.view()))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/publish
pub async fn handle_publish(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(channels): Json<Channels>,
) -> Result<Json<OperationResponse<PublishRecord>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor.publish(channels).await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/status
///
/// Going offline without `confirmed` returns `confirmation_required` and changes nothing.
pub async fn handle_set_status(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<OperationResponse<StatusChange>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor.set_online(request.online, request.confirmed).await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/channels
pub async fn handle_update_channels(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
) -> Result<Json<OperationResponse<PublishRecord>>, AppError> {
    let editor = state.registry.open(&vacancy_id).await?;
    let result = editor.save_and_update_channels().await?;
    Ok(Json(OperationResponse {
        result,
        view: editor.view(),
    }))
}

/// POST /api/v1/vacancies/:vacancy_id/prescreening/leave
pub async fn handle_leave(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
    Json(request): Json<LeaveRequest>,
) -> Json<LeaveResponse> {
    Json(LeaveResponse {
        decision: state.registry.leave(&vacancy_id, request.confirmed),
    })
}
