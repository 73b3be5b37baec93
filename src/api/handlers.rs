//! API route handlers
//!
//! - Upload ingestion (raw CSV body)
//! - Readings window query and alert flags for dashboards
//! - Health and global stats

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::AppConfig;
use crate::pipeline::{IngestError, UploadService};
use crate::storage::{ReadingStore, RecordSink};
use crate::types::{PatientId, ReadingSummary};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub service: UploadService,
    pub config: Arc<AppConfig>,
}

impl ApiState {
    pub fn new(service: UploadService, config: AppConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub readings: usize,
}

#[derive(Debug, Serialize)]
pub struct PatientAlerts {
    pub patient_id: PatientId,
    pub has_alerts: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_readings: usize,
    pub pending_alerts: usize,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Deserialize)]
pub struct ReadingsQuery {
    pub hours: Option<u32>,
    #[serde(default)]
    pub order: SortOrder,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/health
pub async fn health(State(state): State<ApiState>) -> Response {
    let store = state.service.store();
    match store.reading_count() {
        Ok(readings) => ApiResponse::ok(HealthResponse {
            status: "ok",
            backend: store.backend_name(),
            readings,
        }),
        Err(e) => ApiErrorResponse::internal(e.to_string()),
    }
}

/// POST /api/v1/patients/:patient_id/uploads
pub async fn upload(
    State(state): State<ApiState>,
    Path(patient_id): Path<u32>,
    body: Bytes,
) -> Response {
    let patient_id = PatientId(patient_id);

    let result = match state
        .service
        .upload_blocking(patient_id, body.to_vec(), Utc::now())
        .await
    {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(patient_id = %patient_id, error = %e, "Upload task failed");
            return ApiErrorResponse::internal("upload processing failed");
        }
    };

    match result {
        Ok(receipt) => ApiResponse::created(receipt),
        Err(IngestError::EmptyUpload) => {
            ApiErrorResponse::empty_upload("No valid data found in upload")
        }
        Err(e @ IngestError::ProvisioningConflict { .. }) => {
            ApiErrorResponse::provisioning_conflict(e.to_string())
        }
        Err(IngestError::Persistence(e)) => {
            tracing::error!(patient_id = %patient_id, error = %e, "Failed to persist upload");
            ApiErrorResponse::internal(e.to_string())
        }
    }
}

/// GET /api/v1/patients/:patient_id/readings?hours=N&order=asc|desc
pub async fn readings(
    State(state): State<ApiState>,
    Path(patient_id): Path<u32>,
    Query(query): Query<ReadingsQuery>,
) -> Response {
    let hours = query
        .hours
        .unwrap_or(state.config.ingest.default_window_hours);
    if hours == 0 {
        return ApiErrorResponse::bad_request("hours must be > 0");
    }

    let Some(since) = Utc::now().checked_sub_signed(Duration::hours(i64::from(hours))) else {
        return ApiErrorResponse::bad_request(format!("hours={hours} is out of range"));
    };
    match state
        .service
        .store()
        .readings_since(PatientId(patient_id), since)
    {
        Ok(stored) => {
            let mut summaries: Vec<ReadingSummary> =
                stored.iter().map(ReadingSummary::from).collect();
            if query.order == SortOrder::Desc {
                summaries.reverse();
            }
            ApiResponse::ok(summaries)
        }
        Err(e) => ApiErrorResponse::internal(e.to_string()),
    }
}

/// GET /api/v1/patients/:patient_id/alerts
pub async fn patient_alerts(
    State(state): State<ApiState>,
    Path(patient_id): Path<u32>,
) -> Response {
    let patient_id = PatientId(patient_id);
    match state.service.store().patient_has_alerts(patient_id) {
        Ok(has_alerts) => ApiResponse::ok(PatientAlerts {
            patient_id,
            has_alerts,
        }),
        Err(e) => ApiErrorResponse::internal(e.to_string()),
    }
}

/// GET /api/v1/stats
pub async fn stats(State(state): State<ApiState>) -> Response {
    let store = state.service.store();
    let totals = store
        .reading_count()
        .and_then(|total| store.alert_count().map(|alerts| (total, alerts)));
    match totals {
        Ok((total_readings, pending_alerts)) => ApiResponse::ok(StatsResponse {
            total_readings,
            pending_alerts,
        }),
        Err(e) => ApiErrorResponse::internal(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_query_defaults() {
        let q: ReadingsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.hours, None);
        assert_eq!(q.order, SortOrder::Desc);

        let q: ReadingsQuery = serde_json::from_str(r#"{"hours": 6, "order": "asc"}"#).unwrap();
        assert_eq!(q.hours, Some(6));
        assert_eq!(q.order, SortOrder::Asc);
    }
}
