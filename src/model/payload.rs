use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::value::RawValue;
use serde_json::Map;
use serde_json::Value;

use crate::DecodeError;

/// One flag as delivered by the server.
///
/// Only the fields the sync layer may want to inspect are typed; everything
/// else is kept in `extra`. Evaluation is not done here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    #[serde(rename = "defaultValue", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed view of the features document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureApiResponse {
    #[serde(default)]
    pub features: BTreeMap<String, FeatureDefinition>,

    #[serde(rename = "encryptedFeatures", default, skip_serializing_if = "Option::is_none")]
    pub encrypted_features: Option<String>,
}

/// Features document exchanged with the server.
///
/// Holds the JSON text exactly as received next to its decoded view. The text
/// is what gets persisted and handed back out, so a payload survives the cache
/// and the durable mirror without any field being renamed or dropped.
#[derive(Clone)]
pub struct Payload {
    raw: Box<RawValue>,
    document: FeatureApiResponse,
}

impl Payload {
    /// Decodes `text`, rejecting anything that is not a features document.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let raw = RawValue::from_string(text.trim().to_string())?;
        Self::from_raw(raw)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
        Self::from_json(text)
    }

    fn from_raw(raw: Box<RawValue>) -> Result<Self, DecodeError> {
        let document = serde_json::from_str(raw.get())?;
        Ok(Self { raw, document })
    }

    /// The JSON text as received
    pub fn as_json(&self) -> &str {
        self.raw.get()
    }

    pub fn document(&self) -> &FeatureApiResponse {
        &self.document
    }

    pub fn features(&self) -> &BTreeMap<String, FeatureDefinition> {
        &self.document.features
    }

    pub fn feature(
        &self,
        id: &str,
    ) -> Option<&FeatureDefinition> {
        self.document.features.get(id)
    }

    pub fn encrypted_features(&self) -> Option<&str> {
        self.document.encrypted_features.as_deref()
    }
}

impl PartialEq for Payload {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.raw.get() == other.raw.get()
    }
}

impl Eq for Payload {}

impl fmt::Debug for Payload {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Payload")
            .field("features", &self.document.features.len())
            .field("encrypted", &self.document.encrypted_features.is_some())
            .field("bytes", &self.raw.get().len())
            .finish()
    }
}

impl Serialize for Payload {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(D::Error::custom)
    }
}
