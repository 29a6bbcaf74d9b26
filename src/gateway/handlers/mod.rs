//! Thin HTTP handlers: parse the request into typed filters, call the
//! aggregation layer or a store, map the outcome to a response.

pub mod fis;
pub mod results;
pub mod utv;

use crate::aggregation::ReadOutcome;
use crate::core::error::{GatewayError, GatewayResult};
use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt::Display;
use std::str::FromStr;

/// Response header exposing whether the body came from the cache
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

impl IntoResponse for ReadOutcome {
    fn into_response(self) -> Response {
        match self {
            ReadOutcome::Fresh { body, origin } => (
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (X_CACHE, origin.as_str()),
                ],
                body,
            )
                .into_response(),
            ReadOutcome::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Decoded query string.
///
/// List parameters may be repeated (`?season=2024&season=2025`), comma
/// joined (`?season=2024,2025`), or both; all forms yield the same values.
#[derive(Debug, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Decode `raw` and reject any parameter outside `allowed`
    pub fn parse(raw: Option<&str>, allowed: &[&str]) -> GatewayResult<Self> {
        let pairs: Vec<(String, String)> = raw
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        if let Some((unknown, _)) = pairs.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            let reason = if allowed.is_empty() {
                "no query parameters are accepted".to_string()
            } else {
                format!("unknown parameter, allowed: {}", allowed.join(", "))
            };
            return Err(GatewayError::invalid_field(unknown.as_str(), reason));
        }

        Ok(Self { pairs })
    }

    /// First non-empty value of `name`
    pub fn single(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k == name && !v.trim().is_empty())
            .map(|(_, v)| v.trim())
    }

    pub fn required(&self, name: &str) -> GatewayResult<&str> {
        self.single(name)
            .ok_or_else(|| GatewayError::invalid_field(name, "is required"))
    }

    /// Every value of `name`, repeated and comma-joined forms flattened
    pub fn list(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn parse_opt<T>(&self, name: &str) -> GatewayResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.single(name)
            .map(|raw| parse_value(name, raw))
            .transpose()
    }

    pub fn parse_required<T>(&self, name: &str) -> GatewayResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        parse_value(name, self.required(name)?)
    }

    pub fn parse_list<T>(&self, name: &str) -> GatewayResult<Vec<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.list(name)
            .into_iter()
            .map(|raw| parse_value(name, raw))
            .collect()
    }

    /// Parsed values of `name`, sorted with duplicates removed. Two requests
    /// naming the same values in any order or multiplicity yield one set.
    pub fn parse_set<T>(&self, name: &str) -> GatewayResult<Vec<T>>
    where
        T: FromStr + Ord,
        T::Err: Display,
    {
        let mut values = self.parse_list(name)?;
        values.sort();
        values.dedup();
        Ok(values)
    }

    /// Required identifier, rejected unless positive
    pub fn positive_id(&self, name: &str) -> GatewayResult<i32> {
        let id: i32 = self.parse_required(name)?;
        if id <= 0 {
            return Err(GatewayError::invalid_field(name, "must be a positive integer"));
        }
        Ok(id)
    }
}

fn parse_value<T>(name: &str, raw: &str) -> GatewayResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| GatewayError::invalid_field(name, format!("invalid value '{}': {}", raw, e)))
}

/// Unwrap a JSON body, reporting rejections in the gateway's error format
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> GatewayResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| GatewayError::invalid_field("body", rejection.body_text()))
}
