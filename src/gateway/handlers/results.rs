//! FIS result and competitor endpoints (`/v1/fis/{sector}`).
//!
//! A result belongs to one race and one athlete, so every write drops the
//! cached results of both owners. An update that moves a row to another
//! race or athlete drops the previous owners as well.

use super::fis::{race_filter, sector, with_race_filter};
use super::{json_body, QueryParams};
use crate::aggregation::{ReadOutcome, SourceError};
use crate::auth::Caller;
use crate::caching::key_builder::{Dimension, FilterSet};
use crate::caching::resources::{self, Sector};
use crate::core::error::GatewayResult;
use crate::gateway::server::AppState;
use crate::sources::RaceResult;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::json;
use tracing::info;

const ATHLETE_RESULT_PARAMS: &[&str] = &["fiscode", "seasoncode", "disciplinecode", "catcode"];

/// `GET /v1/fis/{sector}/results?raceid=`
///
/// A race without results is 404 and nothing is cached.
pub async fn race_results(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    let params = QueryParams::parse(query.as_deref(), &["raceid"])?;
    let sector = sector(&raw_sector)?;
    let raceid = params.positive_id("raceid")?;

    let filters = FilterSet::new().with(Dimension::Race, raceid);
    let store = state.results.clone();
    state
        .aggregator
        .read_through(&resources::race_results(sector), &filters, || async move {
            let results = store.race_results(sector, raceid).await?;
            if results.is_empty() {
                return Err(SourceError::not_found(format!("results for race {}", raceid)));
            }
            Ok::<_, SourceError>(json!({ "results": results }))
        })
        .await
}

/// `GET /v1/fis/{sector}/results/last`
pub async fn last_result(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    QueryParams::parse(query.as_deref(), &[])?;
    let sector = sector(&raw_sector)?;

    let store = state.results.clone();
    state
        .aggregator
        .read_through(&resources::result_last_row(sector), &FilterSet::new(), || async move {
            let result = store.last_result(sector).await?;
            Ok::<_, SourceError>(json!({ "result": result }))
        })
        .await
}

/// `GET /v1/fis/{sector}/athletes/results?fiscode=`
pub async fn athlete_results(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    let params = QueryParams::parse(query.as_deref(), ATHLETE_RESULT_PARAMS)?;
    let sector = sector(&raw_sector)?;
    let fiscode = params.positive_id("fiscode")?;
    let filter = race_filter(&params)?;

    let filters = with_race_filter(FilterSet::new().with(Dimension::Fiscode, fiscode), &filter);
    let store = state.results.clone();
    state
        .aggregator
        .read_through(&resources::athlete_results(sector), &filters, || async move {
            let results = store.athlete_results(sector, fiscode, &filter).await?;
            Ok::<_, SourceError>(json!({ "results": results }))
        })
        .await
}

/// `GET /v1/fis/{sector}/competitors`
pub async fn competitors(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    QueryParams::parse(query.as_deref(), &[])?;
    let sector = sector(&raw_sector)?;

    let store = state.results.clone();
    state
        .aggregator
        .read_through(&resources::competitors(sector), &FilterSet::new(), || async move {
            let competitors = store.competitors(sector).await?;
            Ok::<_, SourceError>(json!({ "competitors": competitors }))
        })
        .await
}

async fn invalidate_results(state: &AppState, sector: Sector, rows: &[&RaceResult]) {
    let raceids: Vec<i32> = rows.iter().filter_map(|row| row.raceid).collect();
    let fiscodes: Vec<i32> = rows.iter().filter_map(|row| row.fiscode).collect();

    state
        .invalidator
        .invalidate(&resources::result_write_targets(sector, &raceids, &fiscodes))
        .await;
}

/// `POST /v1/fis/{sector}/results`
pub async fn insert_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_sector): Path<String>,
    body: Result<Json<RaceResult>, JsonRejection>,
) -> GatewayResult<StatusCode> {
    let sector = sector(&raw_sector)?;
    let result = json_body(body)?;

    state.results.insert_result(sector, &result).await?;
    invalidate_results(&state, sector, &[&result]).await;

    info!(sector = %sector, recid = result.recid, by = %caller.subject, "Result inserted");
    Ok(StatusCode::CREATED)
}

/// `PUT /v1/fis/{sector}/results`
pub async fn update_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_sector): Path<String>,
    body: Result<Json<RaceResult>, JsonRejection>,
) -> GatewayResult<StatusCode> {
    let sector = sector(&raw_sector)?;
    let result = json_body(body)?;

    let previous = state.results.update_result(sector, &result).await?;
    invalidate_results(&state, sector, &[&previous, &result]).await;

    info!(sector = %sector, recid = result.recid, by = %caller.subject, "Result updated");
    Ok(StatusCode::OK)
}

/// `DELETE /v1/fis/{sector}/results?id=`
pub async fn delete_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<StatusCode> {
    let params = QueryParams::parse(query.as_deref(), &["id"])?;
    let sector = sector(&raw_sector)?;
    let recid = params.positive_id("id")?;

    let deleted = state.results.delete_result(sector, recid).await?;
    invalidate_results(&state, sector, &[&deleted]).await;

    info!(sector = %sector, recid, by = %caller.subject, "Result deleted");
    Ok(StatusCode::OK)
}
