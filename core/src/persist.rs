use crate::idmap::IdMap;
use crate::storage::Storage;
use crate::tokenizer::NormalizerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const TERMS_FILE: &str = "terms.dict";
pub const DOCS_FILE: &str = "docs.dict";
pub const MANIFEST_FILE: &str = "meta.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Human-readable summary of a finished index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: String,
    pub index_name: String,
    pub codec: String,
    pub num_docs: u32,
    pub num_terms: u32,
    pub blocks: Vec<String>,
    /// Normalization the index was built with; queries must use the same.
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

pub fn save_id_map<S: Storage>(store: &S, name: &str, map: &IdMap) -> Result<()> {
    let mut f = store.open_write(name)?;
    let bytes = bincode::serialize(map)?;
    f.write_all(&bytes)?;
    f.flush()?;
    Ok(())
}

pub fn load_id_map<S: Storage>(store: &S, name: &str) -> Result<IdMap> {
    let mut f = store.open_read(name)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let map = bincode::deserialize(&buf).with_context(|| format!("decoding {name}"))?;
    Ok(map)
}

pub fn save_manifest<S: Storage>(store: &S, manifest: &Manifest) -> Result<()> {
    let mut f = store.open_write(MANIFEST_FILE)?;
    let json = serde_json::to_string_pretty(manifest)?;
    f.write_all(json.as_bytes())?;
    f.flush()?;
    Ok(())
}

pub fn load_manifest<S: Storage>(store: &S) -> Result<Manifest> {
    let mut f = store.open_read(MANIFEST_FILE)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let manifest: Manifest = serde_json::from_str(&buf)?;
    Ok(manifest)
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
