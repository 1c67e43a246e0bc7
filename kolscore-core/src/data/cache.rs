//! On-disk price cache: one JSON blob per (ticker, start, end) key.
//!
//! Layout: `{cache_dir}/{TICKER}_{start}_{end}.json`
//!
//! - Freshness is the blob's modification time; there is no index file.
//! - Entries older than the TTL read as absent. No partial-range matching.
//! - Atomic writes (write to a unique .tmp, rename into place), so two
//!   writers racing on one key leave one complete blob, never a torn one.
//! - Integrity validation on load (key echo + BLAKE3 hash of the series).
//! - Quarantine for corrupt blobs (`{filename}.quarantined`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::provider::DataError;
use crate::domain::{DateRange, PriceSeries};

/// Default time-to-live for cached series.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Serialized form of a cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheBlob {
    ticker: String,
    start: NaiveDate,
    end: NaiveDate,
    data_hash: String,
    series: PriceSeries,
}

/// A cached series together with its key and creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub ticker: String,
    pub range: DateRange,
    pub series: PriceSeries,
    pub created_at: SystemTime,
}

impl CacheEntry {
    /// Age relative to now; zero if the clock went backwards.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or(Duration::ZERO)
    }
}

/// Summary of what the cache directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub entries: usize,
    pub fresh: usize,
    pub expired: usize,
}

/// The price cache.
#[derive(Debug, Clone)]
pub struct PriceCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl PriceCache {
    /// Open (creating if needed) a cache rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, DataError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .map_err(|e| DataError::CacheIo(format!("failed to create cache dir: {e}")))?;
        Ok(Self { cache_dir, ttl })
    }

    /// Cache with the default 24h TTL.
    pub fn with_default_ttl(cache_dir: impl Into<PathBuf>) -> Result<Self, DataError> {
        Self::new(cache_dir, DEFAULT_TTL)
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path to the blob for a key.
    fn entry_path(&self, ticker: &str, range: DateRange) -> PathBuf {
        self.cache_dir.join(format!(
            "{}_{}_{}.json",
            sanitize_ticker(ticker),
            range.start(),
            range.end()
        ))
    }

    /// Cached series for exactly this key, if present and younger than the TTL.
    ///
    /// Read failures are logged and reported as a miss.
    pub fn get(&self, ticker: &str, range: DateRange) -> Option<PriceSeries> {
        match self.load_entry(ticker, range) {
            Ok(Some(entry)) if entry.age() < self.ttl => {
                tracing::debug!(ticker, %range, "cache hit");
                Some(entry.series)
            }
            Ok(Some(entry)) => {
                tracing::debug!(ticker, %range, age_secs = entry.age().as_secs(), "cache entry expired");
                None
            }
            Ok(None) => {
                tracing::debug!(ticker, %range, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(ticker, %range, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Load the entry for a key regardless of age.
    pub fn load_entry(&self, ticker: &str, range: DateRange) -> Result<Option<CacheEntry>, DataError> {
        let path = self.entry_path(ticker, range);
        let created_at = match fs::metadata(&path) {
            Ok(meta) => meta
                .modified()
                .map_err(|e| DataError::CacheIo(format!("mtime unavailable: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DataError::CacheIo(format!("stat {}: {e}", path.display()))),
        };

        let bytes = fs::read(&path)
            .map_err(|e| DataError::CacheIo(format!("read {}: {e}", path.display())))?;

        match decode_blob(&bytes, ticker, range) {
            Ok(None) => {
                // A different ticker sanitized to the same file name.
                tracing::debug!(ticker, %range, "cache blob belongs to another key");
                Ok(None)
            }
            Ok(Some(series)) => Ok(Some(CacheEntry {
                ticker: ticker.to_string(),
                range,
                series,
                created_at,
            })),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt cache blob");
                quarantine(&path);
                Err(e)
            }
        }
    }

    /// Store a series under the exact key, overwriting silently.
    pub fn put(&self, ticker: &str, range: DateRange, series: &PriceSeries) -> Result<(), DataError> {
        let blob = CacheBlob {
            ticker: ticker.to_string(),
            start: range.start(),
            end: range.end(),
            data_hash: series_hash(series)?,
            series: series.clone(),
        };
        let json = serde_json::to_vec(&blob)
            .map_err(|e| DataError::CacheIo(format!("blob serialization: {e}")))?;

        let path = self.entry_path(ticker, range);
        let tmp_path = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&tmp_path, json)
            .map_err(|e| DataError::CacheIo(format!("write {}: {e}", tmp_path.display())))?;

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheIo(format!("atomic rename failed: {e}"))
        })?;

        tracing::debug!(ticker, %range, bars = series.len(), "cached series");
        Ok(())
    }

    /// Remove every entry older than `older_than`. Returns the number removed.
    pub fn purge(&self, older_than: Duration) -> Result<usize, DataError> {
        let now = SystemTime::now();
        let mut removed = 0;

        for path in self.blob_paths()? {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > older_than {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove cache entry")
                    }
                }
            }
        }

        tracing::info!(removed, older_than_secs = older_than.as_secs(), "purged cache");
        Ok(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<usize, DataError> {
        let mut removed = 0;
        for path in self.blob_paths()? {
            fs::remove_file(&path)
                .map_err(|e| DataError::CacheIo(format!("remove {}: {e}", path.display())))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Count entries and how many are still within the TTL.
    pub fn status(&self) -> Result<CacheStatus, DataError> {
        let now = SystemTime::now();
        let paths = self.blob_paths()?;
        let fresh = paths
            .iter()
            .filter_map(|p| fs::metadata(p).and_then(|m| m.modified()).ok())
            .filter(|t| now.duration_since(*t).unwrap_or(Duration::ZERO) < self.ttl)
            .count();
        Ok(CacheStatus {
            entries: paths.len(),
            fresh,
            expired: paths.len() - fresh,
        })
    }

    /// All blob files (skips .tmp and .quarantined).
    fn blob_paths(&self) -> Result<Vec<PathBuf>, DataError> {
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| DataError::CacheIo(format!("read dir: {e}")))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheIo(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

/// Tickers such as `BRK/B` are not valid file names everywhere.
fn sanitize_ticker(ticker: &str) -> String {
    ticker
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".quarantined");
    PathBuf::from(name)
}

/// Move a corrupt blob aside. Returns false if it is still in place.
fn quarantine(path: &Path) -> bool {
    let target = quarantine_path(path);
    match fs::rename(path, &target) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                target = %target.display(),
                error = %e,
                "failed to quarantine corrupt cache blob"
            );
            false
        }
    }
}

fn series_hash(series: &PriceSeries) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(series.points())
        .map_err(|e| DataError::CacheIo(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Parse a blob and check it is intact. `Ok(None)` when the blob is intact
/// but stored under a different key.
fn decode_blob(
    bytes: &[u8],
    ticker: &str,
    range: DateRange,
) -> Result<Option<PriceSeries>, DataError> {
    let blob: CacheBlob = serde_json::from_slice(bytes)
        .map_err(|e| DataError::CacheIo(format!("blob parse: {e}")))?;

    if series_hash(&blob.series)? != blob.data_hash {
        return Err(DataError::CacheIo("blob hash mismatch".into()));
    }
    if blob.ticker != ticker || blob.start != range.start() || blob.end != range.end() {
        return Ok(None);
    }
    Ok(Some(blob.series))
}
