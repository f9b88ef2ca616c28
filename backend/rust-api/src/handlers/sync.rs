use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    extractors::AppJson,
    metrics::SYNC_UPSERTS_TOTAL,
    models::{Collection, QuizAttemptRecord, SubmissionRecord, SyncAck, SyncRecord, SyncStatus},
    services::{record_repository::UpsertOutcome, AppState},
};

use super::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsQuery {
    pub student_id: Option<String>,
}

fn parse_collection(name: &str) -> Result<Collection, ApiError> {
    name.parse::<Collection>().map_err(ApiError::not_found)
}

/// Decodes into the collection's record type, validates it and stamps the
/// server-side `synced` status. Every other field passes through untouched.
fn accept_record<R: SyncRecord>(body: serde_json::Value) -> Result<(String, serde_json::Value), ApiError> {
    let mut record: R = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid {} record: {}", R::COLLECTION, e)))?;
    record
        .validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    record.set_sync_status(SyncStatus::Synced);
    let id = record.id().to_string();
    let value = serde_json::to_value(&record)
        .map_err(|e| ApiError::Internal(format!("Failed to encode record: {}", e)))?;
    Ok((id, value))
}

/// POST /api/sync/{collection} - idempotent upsert by record id
pub async fn sync_record(
    State(state): State<Arc<AppState>>,
    Path(collection_name): Path<String>,
    AppJson(body): AppJson<serde_json::Value>,
) -> Result<Json<SyncAck>, ApiError> {
    let collection = parse_collection(&collection_name)?;

    let accepted = match collection {
        Collection::QuizAttempts => accept_record::<QuizAttemptRecord>(body),
        Collection::Submissions => accept_record::<SubmissionRecord>(body),
    };
    let (id, record) = match accepted {
        Ok(accepted) => accepted,
        Err(e) => {
            SYNC_UPSERTS_TOTAL
                .with_label_values(&[collection.as_str(), "rejected"])
                .inc();
            return Err(e);
        }
    };

    let outcome = state.records.upsert(collection, &id, record).await?;
    let created = outcome == UpsertOutcome::Created;

    SYNC_UPSERTS_TOTAL
        .with_label_values(&[
            collection.as_str(),
            if created { "created" } else { "replaced" },
        ])
        .inc();
    tracing::info!(
        "Synced {} record {} (created={})",
        collection,
        id,
        created
    );

    Ok(Json(SyncAck {
        id,
        sync_status: SyncStatus::Synced,
        created,
    }))
}

/// GET /api/sync/{collection}/{id}
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path((collection_name, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let collection = parse_collection(&collection_name)?;

    let record = state
        .records
        .find(collection, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} record {} not found", collection, id)))?;

    Ok(Json(record))
}

/// GET /api/sync/{collection}?studentId=...
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Path(collection_name): Path<String>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let collection = parse_collection(&collection_name)?;
    let student_id = query
        .student_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("studentId query parameter is required"))?;

    let records = state
        .records
        .list_by_student(collection, &student_id)
        .await?;

    Ok(Json(records))
}
