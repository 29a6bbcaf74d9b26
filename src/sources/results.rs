//! FIS result tables (`a_resultnk`, `a_resultjp`, `a_resultcc`) and the
//! shared competitor register (`a_competitor`).
//!
//! Numeric columns (`position`, `bib`, points) travel as text so that no
//! precision is lost between the database and the JSON body.

use super::bounded;
use super::races::RaceFilter;
use crate::aggregation::source::{SourceError, SourceResult};
use crate::caching::resources::Sector;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

const RESULT_SELECT: &str = "recid, raceid, competitorid, status, position::text AS position, \
    bib::text AS bib, fiscode, competitorname, nationcode, timetot, \
    racepoints::text AS racepoints, cuppoints::text AS cuppoints";

const RESULT_COLUMNS: &str = "recid, raceid, competitorid, status, position, bib, fiscode, \
    competitorname, nationcode, timetot, racepoints, cuppoints";

/// One result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RaceResult {
    pub recid: i32,
    pub raceid: Option<i32>,
    pub competitorid: Option<i32>,
    pub status: Option<String>,
    pub position: Option<String>,
    pub bib: Option<String>,
    pub fiscode: Option<i32>,
    pub competitorname: Option<String>,
    pub nationcode: Option<String>,
    pub timetot: Option<String>,
    pub racepoints: Option<String>,
    pub cuppoints: Option<String>,
}

/// One result of an athlete, joined with its race
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AthleteResult {
    pub raceid: i32,
    pub racedate: Option<NaiveDate>,
    pub seasoncode: Option<i32>,
    pub disciplinecode: Option<String>,
    pub catcode: Option<String>,
    pub place: Option<String>,
    pub position: Option<String>,
    pub timetot: Option<String>,
    pub racepoints: Option<String>,
    pub cuppoints: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Competitor {
    pub competitorid: i32,
    pub fiscode: Option<i32>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub nationcode: Option<String>,
    pub gender: Option<String>,
}

/// Result data per sector
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Every result of one race, by position
    async fn race_results(&self, sector: Sector, raceid: i32) -> SourceResult<Vec<RaceResult>>;

    /// Row with the highest `recid`
    async fn last_result(&self, sector: Sector) -> SourceResult<RaceResult>;

    /// Results of the competitor registered under `fiscode`. Fails with
    /// `NotFound` when the sector has no such competitor.
    async fn athlete_results(
        &self,
        sector: Sector,
        fiscode: i32,
        filter: &RaceFilter,
    ) -> SourceResult<Vec<AthleteResult>>;

    async fn competitors(&self, sector: Sector) -> SourceResult<Vec<Competitor>>;

    async fn insert_result(&self, sector: Sector, result: &RaceResult) -> SourceResult<()>;

    /// Replace the row with `result.recid`; returns the row as it was
    async fn update_result(&self, sector: Sector, result: &RaceResult) -> SourceResult<RaceResult>;

    /// Returns the deleted row
    async fn delete_result(&self, sector: Sector, recid: i32) -> SourceResult<RaceResult>;
}

fn table(sector: Sector) -> String {
    format!("a_result{}", sector.code())
}

fn missing(sector: Sector, recid: i32) -> SourceError {
    SourceError::not_found(format!("{} result {}", sector, recid))
}

pub struct PgResultStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgResultStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn race_results(&self, sector: Sector, raceid: i32) -> SourceResult<Vec<RaceResult>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE raceid = $1 ORDER BY position NULLS LAST, recid",
            RESULT_SELECT,
            table(sector)
        );

        let rows = bounded(
            self.query_timeout,
            sqlx::query_as::<_, RaceResult>(&sql)
                .bind(raceid)
                .fetch_all(&self.pool),
        )
        .await?;

        debug!(sector = %sector, raceid, rows = rows.len(), "Fetched race results");
        Ok(rows)
    }

    async fn last_result(&self, sector: Sector) -> SourceResult<RaceResult> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY recid DESC LIMIT 1",
            RESULT_SELECT,
            table(sector)
        );

        bounded(
            self.query_timeout,
            sqlx::query_as::<_, RaceResult>(&sql).fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| SourceError::not_found(format!("{} result", sector)))
    }

    async fn athlete_results(
        &self,
        sector: Sector,
        fiscode: i32,
        filter: &RaceFilter,
    ) -> SourceResult<Vec<AthleteResult>> {
        let competitorid = bounded(
            self.query_timeout,
            sqlx::query_scalar::<_, i32>(
                "SELECT competitorid FROM a_competitor \
                 WHERE fiscode = $1 AND sectorcode = $2 LIMIT 1",
            )
            .bind(fiscode)
            .bind(sector.code().to_ascii_uppercase())
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| SourceError::not_found(format!("competitor with FIS code {}", fiscode)))?;

        let sql = format!(
            "SELECT ra.raceid, ra.racedate, ra.seasoncode, ra.disciplinecode, ra.catcode, \
                    ra.place, re.position::text AS position, re.timetot, \
                    re.racepoints::text AS racepoints, re.cuppoints::text AS cuppoints \
             FROM {results} re JOIN a_race{code} ra ON ra.raceid = re.raceid \
             WHERE re.competitorid = $1 \
               AND (cardinality($2::int4[]) = 0 OR ra.seasoncode = ANY($2)) \
               AND (cardinality($3::text[]) = 0 OR ra.disciplinecode = ANY($3)) \
               AND (cardinality($4::text[]) = 0 OR ra.catcode = ANY($4)) \
             ORDER BY ra.racedate DESC NULLS LAST, ra.raceid DESC",
            results = table(sector),
            code = sector.code()
        );

        let rows = bounded(
            self.query_timeout,
            sqlx::query_as::<_, AthleteResult>(&sql)
                .bind(competitorid)
                .bind(&filter.seasons)
                .bind(&filter.disciplines)
                .bind(&filter.categories)
                .fetch_all(&self.pool),
        )
        .await?;

        debug!(sector = %sector, fiscode, rows = rows.len(), "Fetched athlete results");
        Ok(rows)
    }

    async fn competitors(&self, sector: Sector) -> SourceResult<Vec<Competitor>> {
        bounded(
            self.query_timeout,
            sqlx::query_as::<_, Competitor>(
                "SELECT competitorid, fiscode, firstname, lastname, nationcode, gender \
                 FROM a_competitor WHERE sectorcode = $1 ORDER BY fiscode",
            )
            .bind(sector.code().to_ascii_uppercase())
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn insert_result(&self, sector: Sector, result: &RaceResult) -> SourceResult<()> {
        let sql = format!(
            "INSERT INTO {} ({}) \
             VALUES ($1, $2, $3, $4, $5::numeric, $6::numeric, $7, $8, $9, $10, \
                     $11::numeric, $12::numeric)",
            table(sector),
            RESULT_COLUMNS
        );

        bounded(
            self.query_timeout,
            bind_result(sqlx::query(&sql), result).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn update_result(&self, sector: Sector, result: &RaceResult) -> SourceResult<RaceResult> {
        let select = format!(
            "SELECT {} FROM {} WHERE recid = $1 FOR UPDATE",
            RESULT_SELECT,
            table(sector)
        );
        let update = format!(
            "UPDATE {} SET raceid = $2, competitorid = $3, status = $4, position = $5::numeric, \
             bib = $6::numeric, fiscode = $7, competitorname = $8, nationcode = $9, \
             timetot = $10, racepoints = $11::numeric, cuppoints = $12::numeric \
             WHERE recid = $1",
            table(sector)
        );

        let previous = bounded(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;
            let previous = sqlx::query_as::<_, RaceResult>(&select)
                .bind(result.recid)
                .fetch_optional(&mut *tx)
                .await?;
            if previous.is_some() {
                bind_result(sqlx::query(&update), result)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(previous)
        })
        .await?;

        previous.ok_or_else(|| missing(sector, result.recid))
    }

    async fn delete_result(&self, sector: Sector, recid: i32) -> SourceResult<RaceResult> {
        let sql = format!(
            "DELETE FROM {} WHERE recid = $1 RETURNING {}",
            table(sector),
            RESULT_SELECT
        );

        bounded(
            self.query_timeout,
            sqlx::query_as::<_, RaceResult>(&sql)
                .bind(recid)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| missing(sector, recid))
    }
}

/// Bind every column in `RESULT_COLUMNS` order
fn bind_result<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    result: &'q RaceResult,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(result.recid)
        .bind(result.raceid)
        .bind(result.competitorid)
        .bind(&result.status)
        .bind(&result.position)
        .bind(&result.bib)
        .bind(result.fiscode)
        .bind(&result.competitorname)
        .bind(&result.nationcode)
        .bind(&result.timetot)
        .bind(&result.racepoints)
        .bind(&result.cuppoints)
}
