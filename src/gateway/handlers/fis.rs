//! FIS race endpoints (`/v1/fis/{sector}`).

use super::{json_body, QueryParams};
use crate::aggregation::{ReadOutcome, SourceError};
use crate::auth::Caller;
use crate::caching::key_builder::{Dimension, FilterSet};
use crate::caching::resources::{self, CodeList, Sector};
use crate::core::error::{GatewayError, GatewayResult};
use crate::gateway::server::AppState;
use crate::sources::{Race, RaceFilter};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::info;

const RACE_LIST_PARAMS: &[&str] = &["seasoncode", "disciplinecode", "catcode"];

pub(super) fn sector(raw: &str) -> GatewayResult<Sector> {
    raw.parse()
        .map_err(|_| GatewayError::not_found(format!("sector '{}'", raw)))
}

/// Season, discipline and category filters as canonical sets
pub(super) fn race_filter(params: &QueryParams) -> GatewayResult<RaceFilter> {
    Ok(RaceFilter {
        seasons: params.parse_set("seasoncode")?,
        disciplines: params.parse_set("disciplinecode")?,
        categories: params.parse_set("catcode")?,
    })
}

pub(super) fn with_race_filter(filters: FilterSet, filter: &RaceFilter) -> FilterSet {
    filters
        .with_list(Dimension::Season, filter.seasons.iter().copied())
        .with_list(Dimension::Discipline, filter.disciplines.iter().map(String::as_str))
        .with_list(Dimension::Category, filter.categories.iter().map(String::as_str))
}

async fn code_list(
    state: &AppState,
    raw_sector: &str,
    query: Option<&str>,
    list: CodeList,
) -> GatewayResult<ReadOutcome> {
    QueryParams::parse(query, &[])?;
    let sector = sector(raw_sector)?;
    let store = state.races.clone();

    state
        .aggregator
        .read_through(
            &resources::race_codes(sector, list),
            &FilterSet::new(),
            || async move {
                let body = match list {
                    CodeList::Seasons => json!({ "seasons": store.seasons(sector).await? }),
                    CodeList::Disciplines => {
                        json!({ "disciplines": store.disciplines(sector).await? })
                    }
                    CodeList::Categories => json!({ "categories": store.categories(sector).await? }),
                };
                Ok::<_, SourceError>(body)
            },
        )
        .await
}

/// `GET /v1/fis/{sector}/seasons`
pub async fn seasons(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    code_list(&state, &raw_sector, query.as_deref(), CodeList::Seasons).await
}

/// `GET /v1/fis/{sector}/disciplines`
pub async fn disciplines(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    code_list(&state, &raw_sector, query.as_deref(), CodeList::Disciplines).await
}

/// `GET /v1/fis/{sector}/categories`
pub async fn categories(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    code_list(&state, &raw_sector, query.as_deref(), CodeList::Categories).await
}

/// `GET /v1/fis/{sector}/races`
pub async fn races(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    let params = QueryParams::parse(query.as_deref(), RACE_LIST_PARAMS)?;
    let sector = sector(&raw_sector)?;

    let filter = race_filter(&params)?;
    let filters = with_race_filter(FilterSet::new(), &filter);

    let store = state.races.clone();
    state
        .aggregator
        .read_through(&resources::race_list(sector), &filters, || async move {
            let races = store.races(sector, &filter).await?;
            Ok::<_, SourceError>(json!({ "races": races }))
        })
        .await
}

/// `GET /v1/fis/{sector}/races/last`
pub async fn last_race(
    State(state): State<AppState>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<ReadOutcome> {
    QueryParams::parse(query.as_deref(), &[])?;
    let sector = sector(&raw_sector)?;

    let store = state.races.clone();
    state
        .aggregator
        .read_through(&resources::race_last_row(sector), &FilterSet::new(), || async move {
            let race = store.last_race(sector).await?;
            Ok::<_, SourceError>(json!({ "race": race }))
        })
        .await
}

async fn invalidate_races(state: &AppState, sector: Sector) {
    state
        .invalidator
        .invalidate(&resources::race_write_targets(sector))
        .await;
}

/// `POST /v1/fis/{sector}/races`
pub async fn insert_race(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_sector): Path<String>,
    body: Result<Json<Race>, JsonRejection>,
) -> GatewayResult<StatusCode> {
    let sector = sector(&raw_sector)?;
    let race = json_body(body)?;

    state.races.insert_race(sector, &race).await?;
    invalidate_races(&state, sector).await;

    info!(sector = %sector, raceid = race.raceid, by = %caller.subject, "Race inserted");
    Ok(StatusCode::CREATED)
}

/// `PUT /v1/fis/{sector}/races`
pub async fn update_race(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_sector): Path<String>,
    body: Result<Json<Race>, JsonRejection>,
) -> GatewayResult<StatusCode> {
    let sector = sector(&raw_sector)?;
    let race = json_body(body)?;

    state.races.update_race(sector, &race).await?;
    invalidate_races(&state, sector).await;

    info!(sector = %sector, raceid = race.raceid, by = %caller.subject, "Race updated");
    Ok(StatusCode::OK)
}

/// `DELETE /v1/fis/{sector}/races?id=`
pub async fn delete_race(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_sector): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<StatusCode> {
    let params = QueryParams::parse(query.as_deref(), &["id"])?;
    let sector = sector(&raw_sector)?;
    let raceid = params.positive_id("id")?;

    state.races.delete_race(sector, raceid).await?;
    invalidate_races(&state, sector).await;

    info!(sector = %sector, raceid, by = %caller.subject, "Race deleted");
    Ok(StatusCode::OK)
}
