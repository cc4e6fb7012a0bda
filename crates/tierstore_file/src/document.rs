// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! On-disk document format and atomic persistence.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use jiff::Timestamp;
use ohno::EnrichableExt;
use serde::{Deserialize, Serialize};
use tierstore_tier::{Error, StorageValue};
use tokio::fs;

pub(crate) const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub value: StorageValue,
    pub stored_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl Record {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_older_than(&self, now: Timestamp, age: Duration) -> bool {
        SystemTime::from(now)
            .duration_since(SystemTime::from(self.stored_at))
            .is_ok_and(|elapsed| elapsed > age)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Document {
    pub version: u32,
    pub entries: BTreeMap<String, Record>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Document {
    /// Reads the document at `path`. A missing file is an empty document.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::from_message(e).enrich(format!("failed to read {}", path.display()))),
        };

        let document: Self =
            serde_json::from_slice(&bytes).map_err(|e| Error::from_message(e).enrich(format!("failed to parse {}", path.display())))?;

        if document.version != FORMAT_VERSION {
            return Err(Error::from_message(format!(
                "{} has format version {}, expected {FORMAT_VERSION}",
                path.display(),
                document.version
            )));
        }

        Ok(document)
    }

    /// Writes the document to `path` through a temporary file and a rename.
    pub async fn persist(&self, path: &Path) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(self).map_err(Error::from_message)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::from_message(e).enrich(format!("failed to create {}", parent.display())))?;
        }

        let temp_path = temp_path(path);
        fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| Error::from_message(e).enrich(format!("failed to write {}", temp_path.display())))?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::from_message(e).enrich(format!("failed to replace {}", path.display())));
        }

        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
