//! Wearable telemetry endpoints (`/v1/utv`).

use super::{json_body, QueryParams};
use crate::aggregation::{DateRange, LatestQuery, RangeQuery, ReadOutcome, RecordFilter};
use crate::auth::Caller;
use crate::caching::resources;
use crate::core::error::{GatewayError, GatewayResult};
use crate::gateway::server::AppState;
use crate::sources::TelemetryEntry;
use axum::extract::rejection::JsonRejection;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_LATEST_LIMIT: u32 = 5;
pub const MAX_LATEST_LIMIT: u32 = 100;

const LATEST_PARAMS: &[&str] = &["user_id", "type", "device", "limit"];
const ALL_PARAMS: &[&str] = &["user_id", "type", "after_date", "before_date"];

/// Data kinds are JSON object keys; keep them to a plain identifier
fn parse_kind(params: &QueryParams) -> GatewayResult<RecordFilter> {
    let kind = params.required("type")?;
    let valid = kind.len() <= 64
        && kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(GatewayError::invalid_field(
            "type",
            "must contain only letters, digits, '_' or '-'",
        ));
    }
    Ok(RecordFilter::kind(kind))
}

/// `GET /v1/utv/latest`
pub async fn latest(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    let params = QueryParams::parse(query.as_deref(), LATEST_PARAMS)?;

    let subject: Uuid = params.parse_required("user_id")?;
    let filter = parse_kind(&params)?;

    let device = params.single("device").map(str::to_ascii_lowercase);
    if let Some(device) = &device {
        if !state.aggregator.sources().contains(device) {
            return Err(GatewayError::invalid_field(
                "device",
                format!("must be one of: {}", state.aggregator.sources().names().join(", ")),
            ));
        }
    }

    let limit = params
        .parse_opt::<u32>("limit")?
        .unwrap_or(DEFAULT_LATEST_LIMIT);
    if !(1..=MAX_LATEST_LIMIT).contains(&limit) {
        return Err(GatewayError::invalid_field(
            "limit",
            format!("must be between 1 and {}", MAX_LATEST_LIMIT),
        ));
    }

    state
        .aggregator
        .latest(&LatestQuery {
            subject,
            filter,
            device,
            limit,
        })
        .await
}

/// `GET /v1/utv/all`
pub async fn all(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    let params = QueryParams::parse(query.as_deref(), ALL_PARAMS)?;

    let subject: Uuid = params.parse_required("user_id")?;
    let filter = parse_kind(&params)?;
    let range = DateRange::new(
        params.parse_opt::<NaiveDate>("after_date")?,
        params.parse_opt::<NaiveDate>("before_date")?,
    );
    if !range.is_ordered() {
        return Err(GatewayError::unprocessable(
            "after_date must not be later than before_date",
        ));
    }

    state
        .aggregator
        .range(&RangeQuery {
            subject,
            filter,
            range,
        })
        .await
}

/// Telemetry ingestion payload
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub device: String,
    pub user_id: Uuid,
    pub entries: Vec<TelemetryEntry>,
}

/// `POST /v1/utv/data`
pub async fn ingest(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> GatewayResult<impl IntoResponse> {
    let request = json_body(body)?;
    let device = request.device.to_ascii_lowercase();

    if !state.aggregator.sources().contains(&device) {
        return Err(GatewayError::invalid_field(
            "device",
            format!("must be one of: {}", state.aggregator.sources().names().join(", ")),
        ));
    }
    if request.entries.is_empty() {
        return Err(GatewayError::invalid_field("entries", "must not be empty"));
    }

    let written = state
        .telemetry
        .upsert(&device, request.user_id, &request.entries)
        .await?;

    state
        .invalidator
        .invalidate(&resources::utv_write_targets(request.user_id))
        .await;

    info!(device = %device, written, by = %caller.subject, "Telemetry ingested");
    Ok((StatusCode::CREATED, Json(json!({ "written": written }))))
}
