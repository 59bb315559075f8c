//! Append-only flat-file record store.
//!
//! Profiles live in two JSONL logs: a read-only seed log shipped with the
//! application and a local log receiving every runtime write (creates, edits
//! and tombstones alike). Reads fold both logs id -> latest line, so "edit"
//! and "delete" are both just newer lines. History gets its own append-only
//! log, rewritten in place only by the explicit compaction operations.
//! Settings are one small JSON document, overwritten whole.
//!
//! Single process, single writer. Logs are read fully into memory on every
//! load and appends hit the disk immediately, so a reload right after a
//! write always observes it.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::model::{HistoryEntry, Profile, ProfileBook, ProfileKind, Settings};

const SEED_LOG: &str = "seed_profiles.jsonl";
const LOCAL_LOG: &str = "profiles.local.jsonl";
const HISTORY_LOG: &str = "history.local.jsonl";
const SETTINGS_FILE: &str = "defaults.local.json";

pub struct RecordStore {
    seed_log: PathBuf,
    local_log: PathBuf,
    history_log: PathBuf,
    settings_file: PathBuf,
}

impl RecordStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        RecordStore {
            seed_log: dir.join(SEED_LOG),
            local_log: dir.join(LOCAL_LOG),
            history_log: dir.join(HISTORY_LOG),
            settings_file: dir.join(SETTINGS_FILE),
        }
    }

    /// Seed then local, later lines shadowing earlier ones per id; soft-
    /// deleted survivors are dropped, the rest grouped by kind and sorted
    /// for deterministic display. Missing files read as empty (first run).
    pub fn load_profiles(&self) -> Result<ProfileBook> {
        let mut latest: BTreeMap<String, Profile> = BTreeMap::new();
        for record in read_log::<Profile>(&self.seed_log)?
            .into_iter()
            .chain(read_log::<Profile>(&self.local_log)?)
        {
            latest.insert(record.id().to_string(), record);
        }

        let mut book = ProfileBook::default();
        for record in latest.into_values() {
            if record.is_deleted() {
                continue;
            }
            match record {
                Profile::Provider(p) => book.providers.push(p),
                Profile::Recipient(r) => book.recipients.push(r),
                Profile::PaymentMethod(mut m) => {
                    // One-time legacy bank_transfer reclassification, applied
                    // to whichever line won the fold.
                    m.reclassify_legacy();
                    book.payment_methods.push(m);
                }
            }
        }

        book.providers.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
        book.recipients.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
        book.payment_methods
            .sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

        debug!(
            providers = book.providers.len(),
            recipients = book.recipients.len(),
            payment_methods = book.payment_methods.len(),
            "loaded profiles"
        );
        Ok(book)
    }

    /// Appends the full record to the local log. Create and edit both reduce
    /// to this; earlier lines are never touched.
    pub fn save_profile(&self, record: &Profile) -> Result<()> {
        append_line(&self.local_log, record)
    }

    pub fn upsert_profile(&self, record: &Profile) -> Result<()> {
        self.save_profile(record)
    }

    /// Appends a tombstone; the seed log and all prior lines stay intact.
    pub fn delete_profile(&self, id: &str, kind: ProfileKind) -> Result<()> {
        append_line(&self.local_log, &Profile::tombstone(kind, id))
    }

    pub fn record_invoice_history(&self, entry: &HistoryEntry) -> Result<()> {
        append_line(&self.history_log, entry)
    }

    /// Last `limit` entries, most recent first.
    pub fn load_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = read_log::<HistoryEntry>(&self.history_log)?;
        let keep_from = entries.len().saturating_sub(limit);
        let mut recent: Vec<HistoryEntry> = entries.drain(keep_from..).collect();
        recent.reverse();
        Ok(recent)
    }

    /// Drops entries whose output file no longer exists and, if any were
    /// dropped, rewrites the history log in place. Returns the removed count.
    pub fn prune_missing_history_files(&self) -> Result<usize> {
        let entries = read_log::<HistoryEntry>(&self.history_log)?;
        let total = entries.len();
        let kept: Vec<HistoryEntry> = entries
            .into_iter()
            .filter(|e| Path::new(&e.output_path).exists())
            .collect();
        let removed = total - kept.len();
        if removed > 0 {
            rewrite_log(&self.history_log, &kept)?;
            debug!(removed, "pruned history entries with missing files");
        }
        Ok(removed)
    }

    /// Rewrites the history log omitting every entry with this exact path.
    pub fn remove_history_entry(&self, output_path: &str) -> Result<()> {
        let entries = read_log::<HistoryEntry>(&self.history_log)?;
        let total = entries.len();
        let kept: Vec<HistoryEntry> = entries
            .into_iter()
            .filter(|e| e.output_path != output_path)
            .collect();
        if kept.len() != total {
            rewrite_log(&self.history_log, &kept)?;
        }
        Ok(())
    }

    /// Missing file yields the default empty-but-shaped document.
    pub fn load_settings(&self) -> Result<Settings> {
        if !self.settings_file.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(&self.settings_file)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Whole-document overwrite; the settings file is the one non-log record.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(
            &self.settings_file,
            serde_json::to_string_pretty(settings)?,
        )?;
        Ok(())
    }
}

fn read_log<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(line)?);
    }
    Ok(rows)
}

fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(record)?)?;
    Ok(())
}

fn rewrite_log<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}
