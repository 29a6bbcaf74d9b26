//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use kuha_gateway::aggregation::{
    Aggregator, DateRange, RecordFilter, SourceAdapter, SourceError, SourceRecord,
    SourceRegistry, SourceResult,
};
use kuha_gateway::auth::{AccessPolicy, AuthState, Claims};
use kuha_gateway::caching::{CacheConfig, CacheManager, InMemoryCache, Invalidator, Sector};
use kuha_gateway::core::config::AuthConfig;
use kuha_gateway::gateway::{build_router, AppState};
use kuha_gateway::sources::{
    AthleteResult, Competitor, Race, RaceFilter, RaceResult, RaceStore, ResultStore,
    TelemetryEntry, TelemetryWriter,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-secret";

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

pub fn record(d: u32, value: i64) -> SourceRecord {
    SourceRecord {
        date: day(d),
        data: json!({ "value": value }),
    }
}

#[derive(Clone, Copy)]
pub enum Behaviour {
    Records,
    Fail,
    NotFound,
    Hang,
}

/// Adapter returning canned records and counting its calls
pub struct FakeAdapter {
    name: String,
    records: Mutex<Vec<SourceRecord>>,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(name: &str, records: Vec<SourceRecord>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            records: Mutex::new(records),
            behaviour: Behaviour::Records,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_behaviour(name: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            records: Mutex::new(Vec::new()),
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn push(&self, record: SourceRecord) {
        self.records.lock().unwrap().push(record);
    }

    async fn answer(&self, filter: impl Fn(&SourceRecord) -> bool) -> SourceResult<Vec<SourceRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Records => Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| filter(r))
                .cloned()
                .collect()),
            Behaviour::Fail => Err(SourceError::Query("connection reset".to_string())),
            Behaviour::NotFound => Err(SourceError::not_found("rows")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_latest(
        &self,
        _subject: Uuid,
        _filter: &RecordFilter,
        limit: u32,
    ) -> SourceResult<Vec<SourceRecord>> {
        let mut records = self.answer(|_| true).await?;
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn fetch_range(
        &self,
        _subject: Uuid,
        _filter: &RecordFilter,
        range: DateRange,
    ) -> SourceResult<Vec<SourceRecord>> {
        self.answer(|r| range.contains(r.date)).await
    }
}

/// Race store on a map, counting reads
#[derive(Default)]
pub struct FakeRaceStore {
    races: Mutex<HashMap<Sector, Vec<Race>>>,
    reads: AtomicUsize,
}

impl FakeRaceStore {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn seed(&self, sector: Sector, race: Race) {
        self.races.lock().unwrap().entry(sector).or_default().push(race);
    }

    fn read(&self, sector: Sector) -> Vec<Race> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.races.lock().unwrap().get(&sector).cloned().unwrap_or_default()
    }
}

pub fn race(raceid: i32, season: i32) -> Race {
    Race {
        raceid,
        eventid: None,
        seasoncode: Some(season),
        racecodex: None,
        disciplineid: None,
        disciplinecode: Some("NH".to_string()),
        catcode: Some("WC".to_string()),
        gender: Some("M".to_string()),
        racedate: NaiveDate::from_ymd_opt(season, 1, 10),
        description: None,
        place: Some("Lahti".to_string()),
        nationcode: Some("FIN".to_string()),
        published: Some(1),
        validforfispoints: None,
    }
}

#[async_trait]
impl RaceStore for FakeRaceStore {
    async fn seasons(&self, sector: Sector) -> SourceResult<Vec<i32>> {
        let mut seasons: Vec<i32> = self.read(sector).iter().filter_map(|r| r.seasoncode).collect();
        seasons.sort_unstable();
        seasons.dedup();
        Ok(seasons)
    }

    async fn disciplines(&self, sector: Sector) -> SourceResult<Vec<String>> {
        let mut codes: Vec<String> = self
            .read(sector)
            .into_iter()
            .filter_map(|r| r.disciplinecode)
            .collect();
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    async fn categories(&self, sector: Sector) -> SourceResult<Vec<String>> {
        let mut codes: Vec<String> = self.read(sector).into_iter().filter_map(|r| r.catcode).collect();
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    async fn races(&self, sector: Sector, filter: &RaceFilter) -> SourceResult<Vec<Race>> {
        Ok(self
            .read(sector)
            .into_iter()
            .filter(|r| {
                filter.seasons.is_empty()
                    || r.seasoncode.is_some_and(|s| filter.seasons.contains(&s))
            })
            .collect())
    }

    async fn last_race(&self, sector: Sector) -> SourceResult<Race> {
        self.read(sector)
            .into_iter()
            .max_by_key(|r| r.raceid)
            .ok_or_else(|| SourceError::not_found(format!("{} race", sector)))
    }

    async fn insert_race(&self, sector: Sector, race: &Race) -> SourceResult<()> {
        let mut races = self.races.lock().unwrap();
        let rows = races.entry(sector).or_default();
        if rows.iter().any(|r| r.raceid == race.raceid) {
            return Err(SourceError::Conflict {
                constraint: "a_race_pkey".to_string(),
            });
        }
        rows.push(race.clone());
        Ok(())
    }

    async fn update_race(&self, sector: Sector, race: &Race) -> SourceResult<()> {
        let mut races = self.races.lock().unwrap();
        let row = races
            .entry(sector)
            .or_default()
            .iter_mut()
            .find(|r| r.raceid == race.raceid)
            .ok_or_else(|| SourceError::not_found(format!("{} race {}", sector, race.raceid)))?;
        *row = race.clone();
        Ok(())
    }

    async fn delete_race(&self, sector: Sector, raceid: i32) -> SourceResult<()> {
        let mut races = self.races.lock().unwrap();
        let rows = races.entry(sector).or_default();
        let before = rows.len();
        rows.retain(|r| r.raceid != raceid);
        if rows.len() == before {
            return Err(SourceError::not_found(format!("{} race {}", sector, raceid)));
        }
        Ok(())
    }
}

pub fn result(recid: i32, raceid: i32, fiscode: i32) -> RaceResult {
    RaceResult {
        recid,
        raceid: Some(raceid),
        competitorid: Some(fiscode + 10_000),
        status: None,
        position: Some("1".to_string()),
        bib: None,
        fiscode: Some(fiscode),
        competitorname: Some("Kinnunen Ilkka".to_string()),
        nationcode: Some("FIN".to_string()),
        timetot: None,
        racepoints: None,
        cuppoints: None,
    }
}

pub fn competitor(fiscode: i32) -> Competitor {
    Competitor {
        competitorid: fiscode + 10_000,
        fiscode: Some(fiscode),
        firstname: Some("Ilkka".to_string()),
        lastname: Some("Kinnunen".to_string()),
        nationcode: Some("FIN".to_string()),
        gender: Some("M".to_string()),
    }
}

/// Result store on maps, counting reads
#[derive(Default)]
pub struct FakeResultStore {
    results: Mutex<HashMap<Sector, Vec<RaceResult>>>,
    competitors: Mutex<HashMap<Sector, Vec<Competitor>>>,
    reads: AtomicUsize,
}

impl FakeResultStore {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn seed(&self, sector: Sector, result: RaceResult) {
        self.results.lock().unwrap().entry(sector).or_default().push(result);
    }

    pub fn register(&self, sector: Sector, competitor: Competitor) {
        self.competitors
            .lock()
            .unwrap()
            .entry(sector)
            .or_default()
            .push(competitor);
    }

    fn read(&self, sector: Sector) -> Vec<RaceResult> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.results.lock().unwrap().get(&sector).cloned().unwrap_or_default()
    }

    fn missing(sector: Sector, recid: i32) -> SourceError {
        SourceError::not_found(format!("{} result {}", sector, recid))
    }
}

#[async_trait]
impl ResultStore for FakeResultStore {
    async fn race_results(&self, sector: Sector, raceid: i32) -> SourceResult<Vec<RaceResult>> {
        Ok(self
            .read(sector)
            .into_iter()
            .filter(|r| r.raceid == Some(raceid))
            .collect())
    }

    async fn last_result(&self, sector: Sector) -> SourceResult<RaceResult> {
        self.read(sector)
            .into_iter()
            .max_by_key(|r| r.recid)
            .ok_or_else(|| SourceError::not_found(format!("{} result", sector)))
    }

    async fn athlete_results(
        &self,
        sector: Sector,
        fiscode: i32,
        _filter: &RaceFilter,
    ) -> SourceResult<Vec<AthleteResult>> {
        let registered = self
            .competitors
            .lock()
            .unwrap()
            .get(&sector)
            .is_some_and(|all| all.iter().any(|c| c.fiscode == Some(fiscode)));
        if !registered {
            return Err(SourceError::not_found(format!("competitor with FIS code {}", fiscode)));
        }

        Ok(self
            .read(sector)
            .into_iter()
            .filter(|r| r.fiscode == Some(fiscode))
            .filter_map(|r| {
                Some(AthleteResult {
                    raceid: r.raceid?,
                    racedate: None,
                    seasoncode: None,
                    disciplinecode: None,
                    catcode: None,
                    place: None,
                    position: r.position,
                    timetot: r.timetot,
                    racepoints: r.racepoints,
                    cuppoints: r.cuppoints,
                })
            })
            .collect())
    }

    async fn competitors(&self, sector: Sector) -> SourceResult<Vec<Competitor>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .competitors
            .lock()
            .unwrap()
            .get(&sector)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_result(&self, sector: Sector, result: &RaceResult) -> SourceResult<()> {
        let mut results = self.results.lock().unwrap();
        let rows = results.entry(sector).or_default();
        if rows.iter().any(|r| r.recid == result.recid) {
            return Err(SourceError::Conflict {
                constraint: "a_result_pkey".to_string(),
            });
        }
        rows.push(result.clone());
        Ok(())
    }

    async fn update_result(&self, sector: Sector, result: &RaceResult) -> SourceResult<RaceResult> {
        let mut results = self.results.lock().unwrap();
        let row = results
            .entry(sector)
            .or_default()
            .iter_mut()
            .find(|r| r.recid == result.recid)
            .ok_or_else(|| Self::missing(sector, result.recid))?;
        Ok(std::mem::replace(row, result.clone()))
    }

    async fn delete_result(&self, sector: Sector, recid: i32) -> SourceResult<RaceResult> {
        let mut results = self.results.lock().unwrap();
        let rows = results.entry(sector).or_default();
        let index = rows
            .iter()
            .position(|r| r.recid == recid)
            .ok_or_else(|| Self::missing(sector, recid))?;
        Ok(rows.remove(index))
    }
}

/// Telemetry writer that forwards rows into the matching fake adapter
#[derive(Default)]
pub struct FakeTelemetry {
    adapters: HashMap<String, Arc<FakeAdapter>>,
    writes: AtomicUsize,
}

impl FakeTelemetry {
    pub fn new(adapters: &[Arc<FakeAdapter>]) -> Self {
        Self {
            adapters: adapters
                .iter()
                .map(|a| (a.name().to_string(), a.clone()))
                .collect(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetryWriter for FakeTelemetry {
    async fn upsert(
        &self,
        device: &str,
        _subject: Uuid,
        entries: &[TelemetryEntry],
    ) -> SourceResult<usize> {
        let adapter = self
            .adapters
            .get(device)
            .ok_or_else(|| SourceError::not_found(device.to_string()))?;
        for entry in entries {
            adapter.push(SourceRecord {
                date: entry.date,
                data: entry.data.clone(),
            });
        }
        self.writes.fetch_add(entries.len(), Ordering::SeqCst);
        Ok(entries.len())
    }
}

pub fn memory_cache() -> Arc<CacheManager> {
    Arc::new(CacheManager::new(
        Arc::new(InMemoryCache::default()),
        CacheConfig::default(),
    ))
}

pub fn registry(adapters: &[Arc<FakeAdapter>]) -> Arc<SourceRegistry> {
    let mut registry = SourceRegistry::new();
    for adapter in adapters {
        registry.register(adapter.clone());
    }
    Arc::new(registry)
}

pub fn aggregator(cache: Arc<CacheManager>, adapters: &[Arc<FakeAdapter>]) -> Aggregator {
    Aggregator::new(cache, registry(adapters), Duration::from_millis(500))
}

/// Everything an HTTP test needs, with handles on the fakes
pub struct Harness {
    pub app: axum::Router,
    pub cache: Arc<CacheManager>,
    pub adapters: Vec<Arc<FakeAdapter>>,
    pub races: Arc<FakeRaceStore>,
    pub results: Arc<FakeResultStore>,
    pub telemetry: Arc<FakeTelemetry>,
}

pub fn harness(adapters: Vec<Arc<FakeAdapter>>) -> Harness {
    let cache = memory_cache();
    let races = Arc::new(FakeRaceStore::default());
    let results = Arc::new(FakeResultStore::default());
    let telemetry = Arc::new(FakeTelemetry::new(&adapters));

    let state = AppState {
        aggregator: aggregator(cache.clone(), &adapters),
        invalidator: Invalidator::new(cache.clone()),
        races: races.clone(),
        results: results.clone(),
        telemetry: telemetry.clone(),
    };

    let auth_config = AuthConfig {
        jwt_secret: JWT_SECRET.to_string(),
        ..Default::default()
    };
    let auth = Arc::new(AuthState::new(&auth_config, AccessPolicy::builtin()));

    Harness {
        app: build_router(state, auth, Duration::from_secs(5)),
        cache,
        adapters,
        races,
        results,
        telemetry,
    }
}

pub fn token(role: &str) -> String {
    let claims = Claims {
        sub: "integration".to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 600) as u64,
        iss: None,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn bearer(role: &str) -> axum::http::HeaderValue {
    axum::http::HeaderValue::from_str(&format!("Bearer {}", token(role))).unwrap()
}
