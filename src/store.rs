//! Device document store (signac-style collection files)

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::device::Device;
use crate::error::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// In-memory collection of device documents keyed by `_id`
#[derive(Debug, Clone, Default)]
pub struct DeviceStore {
    documents: Vec<serde_json::Value>,
}

impl DeviceStore {
    /// Load a collection file, gunzipping it when it starts with the gzip magic.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let text = if bytes.starts_with(&GZIP_MAGIC) {
            let mut text = String::new();
            GzDecoder::new(bytes.as_slice()).read_to_string(&mut text)?;
            text
        } else {
            String::from_utf8(bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        };
        let store = Self::from_text(&text)?;
        debug!("Loaded {} documents from {}", store.len(), path.display());
        Ok(store)
    }

    /// Parse either a JSON array of documents or one document per line.
    pub fn from_text(text: &str) -> Result<Self> {
        let trimmed = text.trim_start();
        let documents = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(serde_json::from_str)
                .collect::<std::result::Result<Vec<serde_json::Value>, _>>()?
        };
        Ok(Self { documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents
            .iter()
            .filter_map(|doc| doc.get("_id").and_then(|id| id.as_str()))
    }

    /// Look up a document by `_id` and convert it to a [`Device`].
    pub fn find(&self, id: &str) -> Result<Device> {
        let doc = self
            .documents
            .iter()
            .find(|doc| doc.get("_id").and_then(|v| v.as_str()) == Some(id))
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;
        Device::from_value(doc)
    }
}
