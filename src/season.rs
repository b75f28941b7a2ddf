use std::collections::HashMap;
use std::path::PathBuf;

use crate::engine::{EngineError, Ledger};
use crate::limits::*;

/// One ledger per season, each in `<data_dir>/<season>.journal`. Ledgers are opened lazily.
pub struct SeasonBook {
    ledgers: HashMap<String, Ledger>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

/// Keep only characters that are safe in a file name.
fn sanitize(season: &str) -> Result<String, EngineError> {
    if season.len() > MAX_SEASON_NAME_LEN {
        return Err(EngineError::LimitExceeded("season name too long"));
    }
    let safe: String = season
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(EngineError::NotFound(format!("season {season:?}")));
    }
    Ok(safe)
}

impl SeasonBook {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            ledgers: HashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    pub fn journal_path(&self, season: &str) -> Result<PathBuf, EngineError> {
        Ok(self.data_dir.join(format!("{}.journal", sanitize(season)?)))
    }

    /// Get or lazily open the ledger of `season`.
    pub fn get_or_open(&mut self, season: &str) -> Result<&mut Ledger, EngineError> {
        let name = sanitize(season)?;
        if !self.ledgers.contains_key(&name) {
            if self.ledgers.len() >= MAX_SEASONS {
                return Err(EngineError::LimitExceeded("too many seasons"));
            }
            std::fs::create_dir_all(&self.data_dir)?;
            let path = self.data_dir.join(format!("{name}.journal"));
            let ledger = Ledger::open(&path, self.compact_threshold)?;
            tracing::debug!(season = %name, "season opened");
            self.ledgers.insert(name.clone(), ledger);
        }
        self.ledgers
            .get_mut(&name)
            .ok_or_else(|| EngineError::NotFound(format!("season {name:?}")))
    }

    /// Season names with a journal on disk, sorted.
    pub fn seasons(&self) -> Result<Vec<String>, EngineError> {
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "journal")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Admission;
    use crate::model::*;
    use std::fs;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("tourbook_test_season").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn season_isolation() {
        let dir = test_data_dir("isolation");
        let mut book = SeasonBook::new(dir, 1000);

        let x = Booking::new("X", "Red", span("2024-07-01", "2024-07-04"));
        book.get_or_open("summer").unwrap().insert(x.clone(), Admission::Strict).unwrap();
        book.get_or_open("winter").unwrap().insert(x, Admission::Strict).unwrap();
        book.get_or_open("summer").unwrap().cancel("X").unwrap();

        assert!(book.get_or_open("summer").unwrap().is_empty());
        assert_eq!(book.get_or_open("winter").unwrap().len(), 1);
    }

    #[test]
    fn season_lazy_creation() {
        let dir = test_data_dir("lazy");
        let mut book = SeasonBook::new(dir.clone(), 1000);

        assert!(fs::read_dir(&dir).unwrap().next().is_none());
        book.get_or_open("summer-2024").unwrap();
        assert!(dir.join("summer-2024.journal").exists());
        assert_eq!(book.seasons().unwrap(), vec!["summer-2024"]);
    }

    #[test]
    fn season_reopened_from_disk() {
        let dir = test_data_dir("reopen");
        {
            let mut book = SeasonBook::new(dir.clone(), 1000);
            let ledger = book.get_or_open("fall").unwrap();
            ledger
                .insert(Booking::new("X", "Red", span("2024-10-01", "2024-10-02")), Admission::Strict)
                .unwrap();
        }
        let mut book = SeasonBook::new(dir, 1000);
        assert!(book.get_or_open("fall").unwrap().get("X").is_some());
    }

    #[test]
    fn season_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let mut book = SeasonBook::new(dir.clone(), 1000);

        book.get_or_open("../evil").unwrap();
        assert!(dir.join("evil.journal").exists());

        assert!(book.get_or_open("../..").is_err());
    }

    #[test]
    fn season_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let mut book = SeasonBook::new(dir, 1000);

        let long_name = "x".repeat(MAX_SEASON_NAME_LEN + 1);
        let err = book.get_or_open(&long_name).err().unwrap();
        assert!(err.to_string().contains("season name too long"));
    }

    #[test]
    fn season_count_limit() {
        let dir = test_data_dir("count_limit");
        let mut book = SeasonBook::new(dir, 1000);

        for i in 0..MAX_SEASONS {
            book.get_or_open(&format!("s{i}")).unwrap();
        }
        let err = book.get_or_open("one_more").err().unwrap();
        assert!(err.to_string().contains("too many seasons"));
        // Already open seasons are still reachable
        assert!(book.get_or_open("s0").is_ok());
    }
}
