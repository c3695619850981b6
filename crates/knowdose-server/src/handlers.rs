use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use knowdose_core::{
    ImageAnalysisRequest, MedicationPayload, RecordPayload, SettingsPayload, TextPromptRequest,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::ai::InlineImage;
use crate::error::ApiError;
use crate::extract::{ApiJson, Tenant};
use crate::server::AppState;

#[derive(Serialize)]
pub struct IdResponse {
    id: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    ok: bool,
}

const OK: Json<OkResponse> = Json(OkResponse { ok: true });

pub async fn health() -> impl IntoResponse {
    OK
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

// ---- Medications ----

pub async fn list_medications(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Vec<Value>>, ApiError> {
    Ok(Json(state.repo.list_medications(tenant.as_str()).await?))
}

pub async fn create_medication(
    State(state): State<AppState>,
    tenant: Tenant,
    ApiJson(payload): ApiJson<MedicationPayload>,
) -> Result<Json<IdResponse>, ApiError> {
    let id = state
        .repo
        .create_medication(tenant.as_str(), payload)
        .await?;
    Ok(Json(IdResponse { id }))
}

pub async fn update_medication(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<MedicationPayload>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .repo
        .update_medication(tenant.as_str(), &id, payload)
        .await?;
    Ok(OK)
}

pub async fn delete_medication(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state.repo.delete_medication(tenant.as_str(), &id).await?;
    Ok(OK)
}

// ---- Dose records ----

pub async fn list_all_records(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Vec<Value>>, ApiError> {
    Ok(Json(state.repo.list_records(tenant.as_str(), None).await?))
}

pub async fn list_medication_records(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    Ok(Json(
        state.repo.list_records(tenant.as_str(), Some(&id)).await?,
    ))
}

pub async fn create_record(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<RecordPayload>,
) -> Result<Json<IdResponse>, ApiError> {
    let id = state
        .repo
        .create_record(tenant.as_str(), &id, payload)
        .await?;
    Ok(Json(IdResponse { id }))
}

// ---- Settings ----

pub async fn get_settings(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.repo.get_settings(tenant.as_str()).await?))
}

pub async fn save_settings(
    State(state): State<AppState>,
    tenant: Tenant,
    ApiJson(payload): ApiJson<SettingsPayload>,
) -> Result<Json<OkResponse>, ApiError> {
    state.repo.save_settings(tenant.as_str(), payload).await?;
    Ok(OK)
}

// ---- AI ----

pub async fn ai_text(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TextPromptRequest>,
) -> Result<Json<Value>, ApiError> {
    let text = state.ai.answer(request).await?;
    Ok(Json(json!({ "text": text })))
}

pub async fn ai_analyze_image(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ImageAnalysisRequest>,
) -> Result<Json<Value>, ApiError> {
    let image = InlineImage::from_payload(&request.image_base64)?;
    let result = state.ai.analyze(&request, image).await?;
    Ok(Json(json!({ "result": result })))
}
