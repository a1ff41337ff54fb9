//! Query string access with repeated keys.

use crate::error::{ForgetError, Result};
use std::str::FromStr;

/// Decoded query pairs in request order.
///
/// Empty values count as absent.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// First non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// Every non-empty value for `key`.
    pub fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// A required single value.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| ForgetError::missing_argument(key))
    }

    /// A required repeated value.
    pub fn require_all(&self, key: &str) -> Result<Vec<String>> {
        let values = self.all(key);
        if values.is_empty() {
            return Err(ForgetError::missing_argument(key));
        }
        Ok(values)
    }

    /// An optional value parsed as `T`.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ForgetError::invalid_argument(key, raw)),
        }
    }

    /// An optional flag; accepts `true`/`false` and `1`/`0`.
    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some("1") => Ok(Some(true)),
            Some("0") => Ok(Some(false)),
            Some(raw) => raw
                .to_ascii_lowercase()
                .parse()
                .map(Some)
                .map_err(|_| ForgetError::invalid_argument(key, raw)),
        }
    }

    /// An optional decay rate; must be positive.
    pub fn rate(&self) -> Result<Option<f64>> {
        let rate: Option<f64> = self.parse("rate")?;
        match rate {
            Some(r) if !(r > 0.0 && r.is_finite()) => {
                Err(ForgetError::invalid_argument("rate", &r.to_string()))
            }
            other => Ok(other),
        }
    }
}
