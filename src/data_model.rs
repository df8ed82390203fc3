use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Grouping key for records: one per physical device/unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    pub fn new(id: Uuid) -> Self {
        UnitId(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for UnitId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Uuid::parse_str(trimmed)
            .map(UnitId)
            .map_err(|e| PipelineError::InvalidUnitId {
                value: trimmed.to_string(),
                reason: e.to_string(),
            })
    }
}

impl From<Uuid> for UnitId {
    fn from(id: Uuid) -> Self {
        UnitId(id)
    }
}

/// One parsed row of an ingest file. Field order matches the column order of
/// the tab-delimited format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub n: i64,
    #[serde(with = "base64_bytes")]
    pub mqtt: Vec<u8>,
    pub invid: String,
    pub unit_guid: UnitId,
    pub msg_id: String,
    pub text: String,
    #[serde(with = "base64_bytes")]
    pub context: Vec<u8>,
    pub class: String,
    pub level: i64,
    pub area: String,
    pub addr: String,
    pub block: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub bit: i64,
    pub invert_bit: i64,
}

/// A file discovered by the watcher and waiting to be processed.
///
/// Identity is the full path string; the same string is what gets recorded in
/// the processed set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileTask {
    path: PathBuf,
}

impl FileTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTask { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl fmt::Display for FileTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
