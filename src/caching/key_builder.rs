//! # Cache Key Builder
//!
//! Deterministic cache keys from a resource prefix and a normalized
//! [`FilterSet`].
//!
//! A key has the shape `prefix[:name=value[,value...]]...` where the
//! dimensions appear in their declared order (the order of [`Dimension`]),
//! never in request order. List values are rendered in numeric/lexical
//! order, so `season=2025,2024` and `season=2024&season=2025` share a key.
//! Absent dimensions contribute nothing.
//!
//! Keys are built from the literal values, not hashes. The delimiter
//! characters (`%`, `:`, `,`, `=`) are percent-escaped inside text values so
//! that distinct filter sets can never render to the same string.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use uuid::Uuid;

/// Separator between the prefix and each rendered dimension
pub const KEY_DELIMITER: char = ':';

/// Separator between the values of a list dimension
pub const LIST_DELIMITER: char = ',';

/// Filter dimensions in key order.
///
/// The derived `Ord` follows declaration order and is what fixes the
/// position of every dimension inside a key. The owning entity (`Subject`,
/// `Race` or `Fiscode`) comes first so that all variants cached for one
/// owner share the prefix `resource:subject=<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Subject,
    Race,
    Fiscode,
    Kind,
    Season,
    Discipline,
    Category,
    Device,
    After,
    Before,
    Limit,
}

impl Dimension {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Race => "race",
            Self::Fiscode => "fiscode",
            Self::Kind => "type",
            Self::Season => "season",
            Self::Discipline => "discipline",
            Self::Category => "category",
            Self::Device => "device",
            Self::After => "after",
            Self::Before => "before",
            Self::Limit => "limit",
        }
    }
}

/// One typed filter value.
///
/// Integers sort numerically and dates chronologically, which is the
/// ordering list dimensions are rendered in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterValue {
    Int(i64),
    Date(NaiveDate),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Text(s) => {
                for ch in s.chars() {
                    match ch {
                        '%' | ':' | ',' | '=' => write!(f, "%{:02X}", ch as u32)?,
                        _ => f.write_char(ch)?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        Self::Text(value.hyphenated().to_string())
    }
}

/// Set of optional, independent filter dimensions.
///
/// Values keep the order they were inserted in; ordering for the key is
/// applied by [`build_key`]. Duplicates are kept as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    dims: BTreeMap<Dimension, Vec<FilterValue>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single-valued dimension
    pub fn with<V: Into<FilterValue>>(mut self, dim: Dimension, value: V) -> Self {
        self.set(dim, value);
        self
    }

    /// Set a dimension only when a value is present
    pub fn with_opt<V: Into<FilterValue>>(mut self, dim: Dimension, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.set(dim, value);
        }
        self
    }

    /// Set a list dimension. An empty list leaves the dimension absent.
    pub fn with_list<I, V>(mut self, dim: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.set_list(dim, values);
        self
    }

    pub fn set<V: Into<FilterValue>>(&mut self, dim: Dimension, value: V) {
        self.dims.insert(dim, vec![value.into()]);
    }

    pub fn set_list<I, V>(&mut self, dim: Dimension, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.dims.remove(&dim);
        } else {
            self.dims.insert(dim, values);
        }
    }

    pub fn get(&self, dim: Dimension) -> Option<&[FilterValue]> {
        self.dims.get(&dim).map(Vec::as_slice)
    }

    pub fn contains(&self, dim: Dimension) -> bool {
        self.dims.contains_key(&dim)
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Present dimensions in key order
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &[FilterValue])> {
        self.dims.iter().map(|(dim, values)| (*dim, values.as_slice()))
    }

    pub fn cache_key(&self, prefix: &str) -> String {
        build_key(prefix, self)
    }
}

/// Render the cache key for `prefix` and `filters`.
///
/// Pure and total: the same prefix and the same effective values always
/// produce the same string, whatever order the values were supplied in.
pub fn build_key(prefix: &str, filters: &FilterSet) -> String {
    let mut key = String::with_capacity(prefix.len() + filters.len() * 16);
    key.push_str(prefix);

    for (dim, values) in filters.iter() {
        key.push(KEY_DELIMITER);
        key.push_str(dim.name());
        key.push('=');

        let mut ordered: Vec<&FilterValue> = values.iter().collect();
        ordered.sort();

        for (i, value) in ordered.into_iter().enumerate() {
            if i > 0 {
                key.push(LIST_DELIMITER);
            }
            // Writing into a String cannot fail.
            let _ = write!(key, "{}", value);
        }
    }

    key
}
