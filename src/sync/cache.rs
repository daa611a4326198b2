// Per-theme sync cache
//
// Remembers, for every asset key this process has downloaded or uploaded, the
// content hash and the shop's last-modified timestamp. Persisted as one text
// file per theme in .shopify-theme/<theme_id>.theme:
//
//   <ISO-8601 UTC, millisecond precision> <base64 content hash> <asset key>
//
// The key is the rest of the line and may contain spaces. Any malformed line
// rejects the whole file.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::sync::hash::ContentHash;

/// Directory under the theme root holding config and caches.
pub const STATE_DIR: &str = ".shopify-theme";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub hash: ContentHash,
    pub updated_at: DateTime<Utc>,
}

pub struct ThemeCache {
    cache_file: PathBuf,
    theme_id: u64,
    entries: HashMap<String, CacheEntry>,
}

impl ThemeCache {
    pub fn cache_path(root: &Path, theme_id: u64) -> PathBuf {
        root.join(STATE_DIR).join(format!("{theme_id}.theme"))
    }

    /// Load the cache for a theme. A missing file is an empty cache.
    pub fn open(root: &Path, theme_id: u64) -> Result<Self> {
        let cache_file = Self::cache_path(root, theme_id);

        let entries = match fs::read_to_string(&cache_file) {
            Ok(data) => Self::parse(&cache_file, &data)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(theme_id, entries = entries.len(), path = %cache_file.display(), "loaded theme cache");

        Ok(Self {
            cache_file,
            theme_id,
            entries,
        })
    }

    fn parse(path: &Path, data: &str) -> Result<HashMap<String, CacheEntry>> {
        let mut entries = HashMap::new();

        let normalized = data.replace("\r\n", "\n").replace('\r', "\n");
        for (idx, line) in normalized.split('\n').enumerate() {
            if line.is_empty() {
                continue;
            }
            let (key, entry) = parse_line(line).ok_or_else(|| SyncError::CacheCorrupt {
                path: path.to_path_buf(),
                line: idx + 1,
                content: line.to_string(),
            })?;
            entries.insert(key, entry);
        }

        Ok(entries)
    }

    /// Serialized form, sorted by key for stable output.
    pub fn to_text(&self) -> String {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();

        keys.into_iter()
            .map(|key| {
                let entry = &self.entries[key];
                format!("{} {} {}", format_timestamp(entry.updated_at), entry.hash, key)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rewrite the whole cache file (write temp file, then rename).
    pub fn save(&self) -> Result<()> {
        let dir = self
            .cache_file
            .parent()
            .ok_or_else(|| SyncError::Config("cache path has no parent".to_string()))?;
        fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(self.to_text().as_bytes())?;
        temp.flush()?;
        temp.persist(&self.cache_file).map_err(|e| SyncError::Io(e.error))?;

        debug!(theme_id = self.theme_id, entries = self.entries.len(), "saved theme cache");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// True when the cache knows this key at exactly this remote timestamp.
    pub fn is_current(&self, key: &str, updated_at: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.updated_at == truncate_millis(updated_at))
    }

    /// Store hash and timestamp together.
    pub fn record(&mut self, key: impl Into<String>, hash: ContentHash, updated_at: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                hash,
                updated_at: truncate_millis(updated_at),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn theme_id(&self) -> u64 {
        self.theme_id
    }

    pub fn path(&self) -> &Path {
        &self.cache_file
    }

    pub fn entries(&self) -> &HashMap<String, CacheEntry> {
        &self.entries
    }
}

fn parse_line(line: &str) -> Option<(String, CacheEntry)> {
    let mut parts = line.splitn(3, ' ');
    let timestamp = parse_timestamp(parts.next()?)?;
    let hash = ContentHash::parse(parts.next()?)?;
    let key = parts.next().filter(|k| !k.is_empty())?;

    Some((
        key.to_string(),
        CacheEntry {
            hash,
            updated_at: timestamp,
        },
    ))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if !raw.ends_with('Z') {
        return None;
    }
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    Some(truncate_millis(parsed.with_timezone(&Utc)))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Timestamps are compared at millisecond precision.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
