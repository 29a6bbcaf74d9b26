//! # Multi-Source Aggregation
//!
//! Read path shared by every cached endpoint: build the key, consult the
//! cache, and on a miss call one store or fan out to every applicable
//! [`SourceAdapter`], merging what comes back.

pub mod aggregator;
pub mod source;

pub use aggregator::{
    merge_skipping_failures, Aggregator, CacheOrigin, FanOutReport, LatestQuery, RangeQuery,
    ReadOutcome,
};
pub use source::{
    DateRange, RecordFilter, SourceAdapter, SourceError, SourceRecord, SourceRegistry,
    SourceResult, TaggedRecord,
};
