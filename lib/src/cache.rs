//! Local NFT cache.
//!
//! Persists every confirmed compute result under a single key as a JSON
//! array, token ids stored as hex. Append-only: no dedup, no eviction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::logs::MintResult;

/// Storage key holding the cached NFTs.
pub const CACHE_KEY: &str = "suave_nfts";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid hex token id '{0}'")]
    InvalidTokenId(String),

    #[error("cache storage lock poisoned")]
    Poisoned,
}

/// Durable string storage keyed by namespace.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        (**self).remove(key)
    }
}

/// One `<key>.json` file per key under a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a sibling `.tmp` file and renames it over the target, so a
    /// crash mid-write never leaves a truncated file behind.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedNft {
    #[serde(with = "hex_token_id")]
    pub token_id: U256,
    pub recipient: Address,
    pub signature: Bytes,
    pub query_result: String,
}

impl From<&MintResult> for CachedNft {
    fn from(result: &MintResult) -> Self {
        Self {
            token_id: result.token_id,
            recipient: result.recipient,
            signature: result.signature.clone(),
            query_result: result.query_result.clone(),
        }
    }
}

impl CachedNft {
    pub fn to_result(&self) -> MintResult {
        MintResult {
            recipient: self.recipient,
            signature: self.signature.clone(),
            token_id: self.token_id,
            query_result: self.query_result.clone(),
        }
    }
}

/// Parse `0x`-prefixed (or bare) hex of any case into a `U256`.
pub fn parse_hex_token_id(s: &str) -> Result<U256, CacheError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return Err(CacheError::InvalidTokenId(s.to_string()));
    }
    U256::from_str_radix(digits, 16).map_err(|_| CacheError::InvalidTokenId(s.to_string()))
}

mod hex_token_id {
    use alloy_primitives::U256;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_hex_token_id(&s).map_err(D::Error::custom)
    }
}

pub struct NftCache<S> {
    store: S,
    entries: Vec<CachedNft>,
}

impl<S: KeyValueStore> NftCache<S> {
    /// Read and parse every cached entry.
    pub fn load(store: S) -> Result<Self, CacheError> {
        let entries = match store.get(CACHE_KEY)? {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(&json)?,
            _ => Vec::new(),
        };
        Ok(Self { store, entries })
    }

    /// Like [`NftCache::load`], but an unparseable cache is discarded with a
    /// warning instead of failing. The stored value is only replaced on the
    /// next write. Storage errors still propagate.
    pub fn load_or_reset(store: S) -> Result<Self, CacheError> {
        let json = store.get(CACHE_KEY)?;
        let entries = match json.as_deref().map(str::trim) {
            Some(json) if !json.is_empty() => match serde_json::from_str(json) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("discarding unreadable NFT cache: {e}");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };
        Ok(Self { store, entries })
    }

    /// Add an entry unconditionally and persist the full set.
    pub fn append(&mut self, nft: CachedNft) -> Result<(), CacheError> {
        debug!(token_id = %nft.token_id, recipient = %nft.recipient, "caching NFT");
        self.entries.push(nft);
        self.persist()
    }

    fn persist(&self) -> Result<(), CacheError> {
        let json = serde_json::to_string(&self.entries)?;
        self.store.set(CACHE_KEY, &json)
    }

    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        self.store.remove(CACHE_KEY)
    }

    pub fn entries(&self) -> &[CachedNft] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_recipient(&self, recipient: Address) -> impl Iterator<Item = &CachedNft> {
        self.entries.iter().filter(move |n| n.recipient == recipient)
    }

    /// Most recent entry for a token id.
    pub fn find(&self, token_id: U256) -> Option<&CachedNft> {
        self.entries.iter().rev().find(|n| n.token_id == token_id)
    }
}
