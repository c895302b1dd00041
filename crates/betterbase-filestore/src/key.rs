//! The `spaceId ∥ 0x00 ∥ fileId` compound key `meta` and `blobs` are keyed
//! by, mirroring [`betterbase_core::SpaceId::personal`]'s own use of a
//! NUL-joined composite.

use betterbase_core::SpaceId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub space_id: SpaceId,
    pub file_id: String,
}

impl Serialize for FileKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.compound())
    }
}

impl<'de> Deserialize<'de> for FileKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let mut parts = raw.splitn(2, '\u{0}');
        let space_id = parts.next().ok_or_else(|| serde::de::Error::custom("missing space id"))?;
        let file_id = parts.next().ok_or_else(|| serde::de::Error::custom("missing file id"))?;
        Ok(FileKey::new(SpaceId::from(space_id), file_id))
    }
}

impl FileKey {
    pub fn new(space_id: SpaceId, file_id: impl Into<String>) -> Self {
        Self { space_id, file_id: file_id.into() }
    }

    /// Render the compound key as it is stored in `meta`/`blobs`.
    pub fn compound(&self) -> String {
        format!("{}\u{0}{}", self.space_id.as_str(), self.file_id)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compound())
    }
}
