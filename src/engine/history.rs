//! Immutable crime-attempt journal.
//!
//! Every attempt is appended to `<data_dir>/history/<player_id>.json` for
//! auditability: attempt id, crime, outcome, reward, xp, sentence. File
//! access is guarded with fs2 locks (shared for read, exclusive for write)
//! so a second process inspecting the journal never sees a torn write.
//! Entries are only ever appended; nothing rewrites past outcomes.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded attempt. The id doubles as an idempotency handle should a
/// future procedure revision accept one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrimeAttemptEntry {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub player_id: String,
    pub crime_id: String,
    pub success: bool,
    pub reward: i64,
    pub xp: i64,
    pub jail_minutes: i64,
}

impl CrimeAttemptEntry {
    pub fn new(
        player_id: &str,
        crime_id: &str,
        success: bool,
        reward: i64,
        xp: i64,
        jail_minutes: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            at,
            player_id: player_id.to_string(),
            crime_id: crime_id.to_string(),
            success,
            reward,
            xp,
            jail_minutes,
        }
    }
}

/// On-disk file schema for one player's attempts.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct HistoryFile {
    entries: Vec<CrimeAttemptEntry>,
}

fn ensure_dir(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Append-only journal rooted at a data directory.
#[derive(Debug, Clone)]
pub struct HistoryJournal {
    base_dir: PathBuf,
}

impl HistoryJournal {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn file_path(&self, player_id: &str) -> PathBuf {
        let safe: String = player_id
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join("history").join(format!("{}.json", safe))
    }

    fn load(&self, player_id: &str) -> HistoryFile {
        let path = self.file_path(player_id);
        if let Ok(mut f) = fs::OpenOptions::new().read(true).open(&path) {
            let _ = f.lock_shared();
            let mut s = String::new();
            if let Err(e) = f.read_to_string(&mut s) {
                log::warn!("history: failed reading {:?}: {}", path, e);
                return HistoryFile::default();
            }
            serde_json::from_str(&s).unwrap_or_default()
        } else {
            HistoryFile::default()
        }
    }

    fn save(&self, player_id: &str, file: &HistoryFile) -> io::Result<()> {
        ensure_dir(&self.base_dir.join("history"))?;
        let path = self.file_path(player_id);
        let data = serde_json::to_string_pretty(file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        f.lock_exclusive()?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        let _ = f.unlock();
        Ok(())
    }

    /// Append one attempt. Past entries are never modified.
    pub fn append(&self, entry: CrimeAttemptEntry) -> io::Result<()> {
        let mut file = self.load(&entry.player_id);
        file.entries.push(entry.clone());
        self.save(&entry.player_id, &file)
    }

    /// All recorded attempts for a player, oldest first.
    pub fn read(&self, player_id: &str) -> Vec<CrimeAttemptEntry> {
        self.load(player_id).entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_and_read_back() {
        let dir = TempDir::new().expect("tempdir");
        let journal = HistoryJournal::new(dir.path());
        let now = Utc::now();

        journal
            .append(CrimeAttemptEntry::new("u1", "pickpocket", true, 45, 10, 0, now))
            .expect("append");
        journal
            .append(CrimeAttemptEntry::new("u1", "mugging", false, 0, 20, 35, now))
            .expect("append");
        journal
            .append(CrimeAttemptEntry::new("u2", "pickpocket", true, 30, 10, 0, now))
            .expect("append");

        let mine = journal.read("u1");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].crime_id, "pickpocket");
        assert!(mine[0].success);
        assert_eq!(mine[1].jail_minutes, 35);
        assert_ne!(mine[0].id, mine[1].id);

        assert_eq!(journal.read("u2").len(), 1);
        assert!(journal.read("nobody").is_empty());
    }

    #[test]
    fn player_ids_are_sanitized_into_filenames() {
        let dir = TempDir::new().expect("tempdir");
        let journal = HistoryJournal::new(dir.path());
        let now = Utc::now();
        journal
            .append(CrimeAttemptEntry::new(
                "Weird/Name:!",
                "pickpocket",
                true,
                10,
                5,
                0,
                now,
            ))
            .expect("append");
        assert_eq!(journal.read("Weird/Name:!").len(), 1);
    }
}
