//! Route permissions as an immutable role table.
//!
//! A grant has the form `METHOD:/path-prefix`. The prefix matches whole
//! path segments, so `GET:/v1/fis` covers `/v1/fis/nk/races` but not
//! `/v1/fisheries`. The single grant `*` allows everything.

use axum::http::Method;
use std::collections::HashMap;

/// Grant that allows every method on every path
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Grant {
    Any,
    Route { method: Method, prefix: String },
}

impl Grant {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == WILDCARD {
            return Some(Self::Any);
        }

        let (method, prefix) = raw.split_once(':')?;
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).ok()?;
        let prefix = prefix.trim().trim_end_matches('/');
        if !prefix.starts_with('/') {
            return None;
        }

        Some(Self::Route {
            method,
            prefix: prefix.to_string(),
        })
    }

    fn allows(&self, method: &Method, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Route { method: granted, prefix } => {
                granted == method
                    && (prefix.is_empty()
                        || path == prefix
                        || path
                            .strip_prefix(prefix.as_str())
                            .is_some_and(|rest| rest.starts_with('/')))
            }
        }
    }
}

/// Role to grants table, fixed at startup
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    roles: HashMap<String, Vec<Grant>>,
}

impl AccessPolicy {
    /// Parse a role table. Returns the grants that failed to parse.
    pub fn from_table(table: &HashMap<String, Vec<String>>) -> Result<Self, Vec<String>> {
        let mut roles = HashMap::new();
        let mut invalid = Vec::new();

        for (role, grants) in table {
            let mut parsed = Vec::with_capacity(grants.len());
            for raw in grants {
                match Grant::parse(raw) {
                    Some(grant) => parsed.push(grant),
                    None => invalid.push(format!("{}: {}", role, raw)),
                }
            }
            roles.insert(role.clone(), parsed);
        }

        if invalid.is_empty() {
            Ok(Self { roles })
        } else {
            Err(invalid)
        }
    }

    /// Built-in roles: `admin` plus a read/write and a read-only role per
    /// domain
    pub fn builtin() -> Self {
        let mut table = HashMap::new();
        table.insert("admin".to_string(), vec![WILDCARD.to_string()]);

        for domain in ["fis", "utv"] {
            let full = ["GET", "POST", "PUT", "DELETE"]
                .iter()
                .map(|method| format!("{}:/v1/{}", method, domain))
                .collect();
            table.insert(domain.to_string(), full);
            table.insert(format!("{}_read", domain), vec![format!("GET:/v1/{}", domain)]);
        }

        // Every builtin grant is well formed.
        Self::from_table(&table).unwrap_or_default()
    }

    /// Configured table, or the builtin one when none is configured
    pub fn from_config(table: &HashMap<String, Vec<String>>) -> Result<Self, Vec<String>> {
        if table.is_empty() {
            Ok(Self::builtin())
        } else {
            Self::from_table(table)
        }
    }

    pub fn allows(&self, role: &str, method: &Method, path: &str) -> bool {
        self.roles
            .get(role)
            .is_some_and(|grants| grants.iter().any(|g| g.allows(method, path)))
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let policy = AccessPolicy::builtin();

        assert!(policy.allows("admin", &Method::DELETE, "/v1/anything"));
        assert!(policy.allows("fis", &Method::POST, "/v1/fis/nk/races"));
        assert!(policy.allows("fis_read", &Method::GET, "/v1/fis/jp/seasons"));
        assert!(!policy.allows("fis_read", &Method::POST, "/v1/fis/jp/races"));
        assert!(!policy.allows("fis", &Method::GET, "/v1/utv/latest"));
        assert!(!policy.allows("nobody", &Method::GET, "/v1/fis"));
    }

    #[test]
    fn test_prefix_matches_whole_segments() {
        let mut table = HashMap::new();
        table.insert("r".to_string(), vec!["GET:/v1/fis/".to_string()]);
        let policy = AccessPolicy::from_table(&table).unwrap();

        assert!(policy.allows("r", &Method::GET, "/v1/fis"));
        assert!(policy.allows("r", &Method::GET, "/v1/fis/cc/races/last"));
        assert!(!policy.allows("r", &Method::GET, "/v1/fisheries"));
    }

    #[test]
    fn test_invalid_grants_are_reported() {
        let mut table = HashMap::new();
        table.insert("r".to_string(), vec!["GET".to_string(), "get:/v1".to_string()]);

        let invalid = AccessPolicy::from_table(&table).unwrap_err();
        assert_eq!(invalid, vec!["r: GET".to_string()]);
    }

    #[test]
    fn test_empty_config_falls_back_to_builtin() {
        let policy = AccessPolicy::from_config(&HashMap::new()).unwrap();
        assert!(policy.allows("utv_read", &Method::GET, "/v1/utv/all"));
    }
}
