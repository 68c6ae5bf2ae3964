use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::constants::CONFIG_KEY_SEPARATOR;
use crate::DecodeError;

/// Identifies one remote configuration source: `(api host, client key)`.
///
/// Clients built with equal keys share one cache entry, one in-flight fetch
/// and one stream subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    api_host: String,
    client_key: String,
}

impl ConfigKey {
    /// Trailing slashes on `api_host` are dropped so that
    /// `https://cdn.example.com/` and `https://cdn.example.com` address the
    /// same source.
    pub fn new(
        api_host: impl Into<String>,
        client_key: impl Into<String>,
    ) -> Self {
        let api_host = api_host.into();
        Self {
            api_host: api_host.trim_end_matches('/').to_string(),
            client_key: client_key.into(),
        }
    }

    /// Like [`ConfigKey::new`], but rejects an empty host or client key.
    /// Use it for keys taken from user input.
    pub fn try_new(
        api_host: impl Into<String>,
        client_key: impl Into<String>,
    ) -> Result<Self, DecodeError> {
        let key = Self::new(api_host, client_key);
        if key.api_host.is_empty() || key.client_key.is_empty() {
            return Err(DecodeError::InvalidKey(key.to_string()));
        }
        Ok(key)
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    /// `{api_host}{path}/{client_key}`
    pub fn endpoint(
        &self,
        path: &str,
    ) -> String {
        format!("{}{}/{}", self.api_host, path.trim_end_matches('/'), self.client_key)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}{}{}", self.api_host, CONFIG_KEY_SEPARATOR, self.client_key)
    }
}

impl FromStr for ConfigKey {
    type Err = DecodeError;

    /// Inverse of `Display` for every key `new` can build, so persisted keys
    /// always load back.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(CONFIG_KEY_SEPARATOR) {
            Some((host, key)) => Ok(Self::new(host, key)),
            None => Err(DecodeError::InvalidKey(s.to_string())),
        }
    }
}

impl Serialize for ConfigKey {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConfigKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
