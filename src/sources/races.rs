//! FIS race tables, one per sector (`a_racenk`, `a_racejp`, `a_racecc`).

use super::bounded;
use crate::aggregation::source::{SourceError, SourceResult};
use crate::caching::resources::Sector;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

const RACE_COLUMNS: &str = "raceid, eventid, seasoncode, racecodex, disciplineid, \
    disciplinecode, catcode, gender, racedate, description, place, nationcode, \
    published, validforfispoints";

/// One race row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Race {
    pub raceid: i32,
    pub eventid: Option<i32>,
    pub seasoncode: Option<i32>,
    pub racecodex: Option<i32>,
    pub disciplineid: Option<String>,
    pub disciplinecode: Option<String>,
    pub catcode: Option<String>,
    pub gender: Option<String>,
    pub racedate: Option<NaiveDate>,
    pub description: Option<String>,
    pub place: Option<String>,
    pub nationcode: Option<String>,
    pub published: Option<i16>,
    pub validforfispoints: Option<i16>,
}

/// Optional list filters; an empty list matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaceFilter {
    pub seasons: Vec<i32>,
    pub disciplines: Vec<String>,
    pub categories: Vec<String>,
}

/// Race data per sector
#[async_trait]
pub trait RaceStore: Send + Sync {
    async fn seasons(&self, sector: Sector) -> SourceResult<Vec<i32>>;

    async fn disciplines(&self, sector: Sector) -> SourceResult<Vec<String>>;

    async fn categories(&self, sector: Sector) -> SourceResult<Vec<String>>;

    async fn races(&self, sector: Sector, filter: &RaceFilter) -> SourceResult<Vec<Race>>;

    /// Row with the highest `raceid`
    async fn last_race(&self, sector: Sector) -> SourceResult<Race>;

    async fn insert_race(&self, sector: Sector, race: &Race) -> SourceResult<()>;

    /// Fails with `NotFound` when no row has `race.raceid`
    async fn update_race(&self, sector: Sector, race: &Race) -> SourceResult<()>;

    /// Fails with `NotFound` when no row has `raceid`
    async fn delete_race(&self, sector: Sector, raceid: i32) -> SourceResult<()>;
}

fn table(sector: Sector) -> String {
    format!("a_race{}", sector.code())
}

pub struct PgRaceStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgRaceStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    async fn distinct_text(&self, sector: Sector, column: &str) -> SourceResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL ORDER BY {column}",
            column = column,
            table = table(sector)
        );
        bounded(
            self.query_timeout,
            sqlx::query_scalar::<_, String>(&sql).fetch_all(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl RaceStore for PgRaceStore {
    async fn seasons(&self, sector: Sector) -> SourceResult<Vec<i32>> {
        let sql = format!(
            "SELECT DISTINCT seasoncode FROM {} WHERE seasoncode IS NOT NULL ORDER BY seasoncode",
            table(sector)
        );
        bounded(
            self.query_timeout,
            sqlx::query_scalar::<_, i32>(&sql).fetch_all(&self.pool),
        )
        .await
    }

    async fn disciplines(&self, sector: Sector) -> SourceResult<Vec<String>> {
        self.distinct_text(sector, "disciplinecode").await
    }

    async fn categories(&self, sector: Sector) -> SourceResult<Vec<String>> {
        self.distinct_text(sector, "catcode").await
    }

    async fn races(&self, sector: Sector, filter: &RaceFilter) -> SourceResult<Vec<Race>> {
        let sql = format!(
            "SELECT {} FROM {} \
             WHERE (cardinality($1::int4[]) = 0 OR seasoncode = ANY($1)) \
               AND (cardinality($2::text[]) = 0 OR disciplinecode = ANY($2)) \
               AND (cardinality($3::text[]) = 0 OR catcode = ANY($3)) \
             ORDER BY racedate DESC NULLS LAST, raceid DESC",
            RACE_COLUMNS,
            table(sector)
        );

        let rows = bounded(
            self.query_timeout,
            sqlx::query_as::<_, Race>(&sql)
                .bind(&filter.seasons)
                .bind(&filter.disciplines)
                .bind(&filter.categories)
                .fetch_all(&self.pool),
        )
        .await?;

        debug!(sector = %sector, rows = rows.len(), "Fetched races");
        Ok(rows)
    }

    async fn last_race(&self, sector: Sector) -> SourceResult<Race> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY raceid DESC LIMIT 1",
            RACE_COLUMNS,
            table(sector)
        );

        bounded(
            self.query_timeout,
            sqlx::query_as::<_, Race>(&sql).fetch_one(&self.pool),
        )
        .await
        .map_err(|e| match e {
            SourceError::NotFound { .. } => SourceError::not_found(format!("{} race", sector)),
            other => other,
        })
    }

    async fn insert_race(&self, sector: Sector, race: &Race) -> SourceResult<()> {
        let sql = format!(
            "INSERT INTO {} ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            table(sector),
            RACE_COLUMNS
        );

        bounded(
            self.query_timeout,
            bind_race(sqlx::query(&sql), race).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn update_race(&self, sector: Sector, race: &Race) -> SourceResult<()> {
        let sql = format!(
            "UPDATE {} SET eventid = $2, seasoncode = $3, racecodex = $4, disciplineid = $5, \
             disciplinecode = $6, catcode = $7, gender = $8, racedate = $9, description = $10, \
             place = $11, nationcode = $12, published = $13, validforfispoints = $14 \
             WHERE raceid = $1",
            table(sector)
        );

        let result = bounded(
            self.query_timeout,
            bind_race(sqlx::query(&sql), race).execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(SourceError::not_found(format!("{} race {}", sector, race.raceid)));
        }
        Ok(())
    }

    async fn delete_race(&self, sector: Sector, raceid: i32) -> SourceResult<()> {
        let sql = format!("DELETE FROM {} WHERE raceid = $1", table(sector));

        let result = bounded(
            self.query_timeout,
            sqlx::query(&sql).bind(raceid).execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(SourceError::not_found(format!("{} race {}", sector, raceid)));
        }
        Ok(())
    }
}

/// Bind every column in `RACE_COLUMNS` order
fn bind_race<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    race: &'q Race,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(race.raceid)
        .bind(race.eventid)
        .bind(race.seasoncode)
        .bind(race.racecodex)
        .bind(&race.disciplineid)
        .bind(&race.disciplinecode)
        .bind(&race.catcode)
        .bind(&race.gender)
        .bind(race.racedate)
        .bind(&race.description)
        .bind(&race.place)
        .bind(&race.nationcode)
        .bind(race.published)
        .bind(race.validforfispoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(table(Sector::Nk), "a_racenk");
        assert_eq!(table(Sector::Cc), "a_racecc");
    }

    #[test]
    fn test_race_accepts_sparse_payload() {
        let race: Race = serde_json::from_value(serde_json::json!({
            "raceid": 500,
            "seasoncode": 2025,
            "disciplinecode": "GS",
            "catcode": "WC",
            "gender": "M",
            "racedate": "2025-01-12",
            "place": "Lahti",
            "nationcode": "FIN",
            "published": 1
        }))
        .unwrap();

        assert_eq!(race.raceid, 500);
        assert_eq!(race.racedate, NaiveDate::from_ymd_opt(2025, 1, 12));
    }
}
