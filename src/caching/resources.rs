//! Catalog of cached resources.
//!
//! Every cached response belongs to a [`CacheResource`]: a key prefix plus
//! the TTL class that decides how long its entries live. Writes describe
//! what they touched with [`ResourceDescriptor`]s derived from the same
//! catalog, so readers and the invalidator always agree on prefixes.

use super::key_builder::{build_key, Dimension, FilterSet, FilterValue, KEY_DELIMITER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How long entries of a resource may live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlClass {
    /// Code lists and race data that change rarely (hours)
    Reference,
    /// Per-user telemetry aggregations (minutes)
    Volatile,
}

/// Either one exact cache key or every key under a prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceDescriptor {
    Exact(String),
    /// The prefix itself plus every key below `prefix:`
    Family(String),
}

impl ResourceDescriptor {
    pub fn key(&self) -> &str {
        match self {
            Self::Exact(key) | Self::Family(key) => key,
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => write!(f, "exact({})", key),
            Self::Family(prefix) => write!(f, "family({})", prefix),
        }
    }
}

/// A cached resource family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResource {
    prefix: String,
    ttl_class: TtlClass,
}

impl CacheResource {
    pub fn new(prefix: impl Into<String>, ttl_class: TtlClass) -> Self {
        Self {
            prefix: prefix.into(),
            ttl_class,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn ttl_class(&self) -> TtlClass {
        self.ttl_class
    }

    pub fn key(&self, filters: &FilterSet) -> String {
        build_key(&self.prefix, filters)
    }

    /// The dimensionless key, for single-entity resources
    pub fn exact(&self) -> ResourceDescriptor {
        ResourceDescriptor::Exact(self.prefix.clone())
    }

    /// Every variant of this resource
    pub fn family(&self) -> ResourceDescriptor {
        ResourceDescriptor::Family(self.prefix.clone())
    }

    /// Every variant cached under one value of a leading dimension
    pub fn owned_family<V: Into<FilterValue>>(&self, owner: Dimension, value: V) -> ResourceDescriptor {
        let filters = FilterSet::new().with(owner, value);
        ResourceDescriptor::Family(self.key(&filters))
    }

    /// Every variant cached for one subject
    pub fn subject_family(&self, subject: Uuid) -> ResourceDescriptor {
        self.owned_family(Dimension::Subject, subject)
    }
}

/// FIS competition sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    /// Nordic combined
    Nk,
    /// Ski jumping
    Jp,
    /// Cross-country
    Cc,
}

impl Sector {
    pub const ALL: [Sector; 3] = [Sector::Nk, Sector::Jp, Sector::Cc];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Nk => "nk",
            Self::Jp => "jp",
            Self::Cc => "cc",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nk" => Ok(Self::Nk),
            "jp" => Ok(Self::Jp),
            "cc" => Ok(Self::Cc),
            other => Err(format!("unknown sector '{}', expected one of nk, jp, cc", other)),
        }
    }
}

/// Code lists published per sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeList {
    Seasons,
    Disciplines,
    Categories,
}

impl CodeList {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Seasons => "seasons",
            Self::Disciplines => "disciplines",
            Self::Categories => "categories",
        }
    }
}

fn race_prefix(sector: Sector) -> String {
    format!("fis:race{}", sector.code())
}

/// `fis:race{sector}:codes:{list}`
pub fn race_codes(sector: Sector, list: CodeList) -> CacheResource {
    CacheResource::new(
        format!("{}{}codes{}{}", race_prefix(sector), KEY_DELIMITER, KEY_DELIMITER, list.name()),
        TtlClass::Reference,
    )
}

/// Parent of the three code lists of a sector
pub fn race_codes_family(sector: Sector) -> ResourceDescriptor {
    ResourceDescriptor::Family(format!("{}{}codes", race_prefix(sector), KEY_DELIMITER))
}

/// `fis:race{sector}:list`, filtered by season, discipline and category
pub fn race_list(sector: Sector) -> CacheResource {
    CacheResource::new(
        format!("{}{}list", race_prefix(sector), KEY_DELIMITER),
        TtlClass::Reference,
    )
}

/// `fis:race{sector}:lastrow`, no dimensions
pub fn race_last_row(sector: Sector) -> CacheResource {
    CacheResource::new(
        format!("{}{}lastrow", race_prefix(sector), KEY_DELIMITER),
        TtlClass::Reference,
    )
}

/// Everything a race write in `sector` can make stale. Athlete results
/// embed race columns, so every athlete of the sector goes too.
pub fn race_write_targets(sector: Sector) -> Vec<ResourceDescriptor> {
    vec![
        race_last_row(sector).exact(),
        race_list(sector).family(),
        race_codes_family(sector),
        athlete_results(sector).family(),
    ]
}

/// `fis:result{sector}:race=<raceid>`, the full result list of one race
pub fn race_results(sector: Sector) -> CacheResource {
    CacheResource::new(format!("fis:result{}", sector.code()), TtlClass::Reference)
}

/// `fis:result{sector}:lastrow`, no dimensions
pub fn result_last_row(sector: Sector) -> CacheResource {
    CacheResource::new(
        format!("fis:result{}{}lastrow", sector.code(), KEY_DELIMITER),
        TtlClass::Reference,
    )
}

/// `fis:athlete{sector}:fiscode=<n>`, filtered by season, discipline and
/// category
pub fn athlete_results(sector: Sector) -> CacheResource {
    CacheResource::new(format!("fis:athlete{}", sector.code()), TtlClass::Reference)
}

/// `fis:competitors{sector}`
pub fn competitors(sector: Sector) -> CacheResource {
    CacheResource::new(format!("fis:competitors{}", sector.code()), TtlClass::Reference)
}

/// Everything a result write in `sector` can make stale: the last row,
/// the result lists of every race the written rows belong to and the
/// result lists of every athlete they belong to
pub fn result_write_targets(
    sector: Sector,
    raceids: &[i32],
    fiscodes: &[i32],
) -> Vec<ResourceDescriptor> {
    let mut targets = vec![result_last_row(sector).exact()];
    for &raceid in raceids {
        targets.push(race_results(sector).owned_family(Dimension::Race, raceid));
    }
    for &fiscode in fiscodes {
        targets.push(athlete_results(sector).owned_family(Dimension::Fiscode, fiscode));
    }
    targets.dedup();
    targets
}

/// Latest telemetry rows per user, fanned out across devices
pub fn utv_latest() -> CacheResource {
    CacheResource::new("utv:latest", TtlClass::Volatile)
}

/// Telemetry rows in a date range per user, fanned out across devices
pub fn utv_all() -> CacheResource {
    CacheResource::new("utv:all", TtlClass::Volatile)
}

/// Everything a telemetry write for `subject` can make stale
pub fn utv_write_targets(subject: Uuid) -> Vec<ResourceDescriptor> {
    vec![
        utv_latest().subject_family(subject),
        utv_all().subject_family(subject),
    ]
}
