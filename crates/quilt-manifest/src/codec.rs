//! JSON-lines manifest encoding.

use quilt_storage::{ClientCache, PhysicalKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entry::{Entry, Hash, HashType};
use crate::error::{ManifestError, ManifestResult};
use crate::manifest::{check_version, Manifest, ManifestBuilder};

#[derive(Serialize)]
struct RowOut<'a> {
    logical_key: &'a str,
    physical_keys: [String; 1],
    size: u64,
    hash: &'a Hash,
    meta: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct RowIn {
    logical_key: String,
    #[serde(default)]
    physical_keys: Option<Vec<String>>,
    size: u64,
    hash: Option<RowHash>,
    #[serde(default)]
    meta: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct RowHash {
    #[serde(rename = "type")]
    hash_type: String,
    value: String,
}

impl Manifest {
    /// Encode as JSON lines: the header, then one row per entry in order.
    pub fn serialize(&self) -> ManifestResult<Vec<u8>> {
        check_version(self.metadata())?;
        let mut out = serde_json::to_vec(self.metadata())?;
        out.push(b'\n');
        for (logical_key, entry) in self.entries() {
            let hash = entry
                .hash()
                .ok_or_else(|| ManifestError::UnhashedEntry(logical_key.to_owned()))?;
            let row = RowOut {
                logical_key,
                physical_keys: [entry.physical_key().to_uri()],
                size: entry.size(),
                hash,
                meta: entry.meta(),
            };
            serde_json::to_writer(&mut out, &row)?;
            out.push(b'\n');
        }
        Ok(out)
    }

    /// Decode a JSON-lines manifest.
    ///
    /// Blank lines are ignored, as are rows whose `physical_keys` is missing
    /// or empty. A row with several physical keys uses the first.
    pub fn parse(data: &[u8]) -> ManifestResult<Manifest> {
        let text = std::str::from_utf8(data).map_err(|e| ManifestError::Parse {
            line: 1,
            reason: e.to_string(),
        })?;
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines.next().ok_or(ManifestError::Parse {
            line: 1,
            reason: "missing header".to_owned(),
        })?;
        let metadata = match serde_json::from_str::<Value>(header) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(ManifestError::Parse {
                    line: 1,
                    reason: "header is not an object".to_owned(),
                })
            }
            Err(e) => {
                return Err(ManifestError::Parse {
                    line: 1,
                    reason: e.to_string(),
                })
            }
        };
        check_version(&metadata)?;

        let mut builder = ManifestBuilder::new();
        builder.set_metadata(metadata);
        for (line, text) in lines {
            let parse_err = |reason: String| ManifestError::Parse { line, reason };
            let row: RowIn = serde_json::from_str(text).map_err(|e| parse_err(e.to_string()))?;
            let Some(uri) = row.physical_keys.and_then(|keys| keys.into_iter().next()) else {
                continue;
            };
            let physical_key = PhysicalKey::from_uri(&uri)?;
            let hash = row
                .hash
                .map(|h| {
                    Ok::<_, ManifestError>(Hash {
                        hash_type: h.hash_type.parse::<HashType>()?,
                        value: h.value,
                    })
                })
                .transpose()?;
            builder.add_entry(
                row.logical_key,
                Entry::new(physical_key, row.size, hash, row.meta),
            );
        }
        builder.build()
    }

    /// Load a manifest from the blob at `key`.
    pub async fn create_from_file(key: &PhysicalKey, clients: &ClientCache) -> ManifestResult<Manifest> {
        let data = key.get_bytes(clients).await?;
        Manifest::parse(&data)
    }
}
