use crate::economy::EconomyState;
use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

/// Durable snapshot boundary. Loaded once at session start to seed the
/// cache; written after each confirmed change so a restart before the next
/// full server sync does not lose confirmed state.
pub trait PersistentMirror {
    /// None when no snapshot has been written yet (first run).
    fn load_snapshot(&self) -> Result<Option<EconomyState>>;

    fn save_snapshot(&self, state: &EconomyState) -> Result<()>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MirrorFile {
    saved_at: String,
    state: EconomyState,
}

/// JSON-file-backed mirror. Writes go to a temp file first and are renamed
/// into place so a crash mid-write cannot corrupt the previous snapshot.
#[derive(Debug)]
pub struct JsonFileMirror {
    path: PathBuf,
}

impl JsonFileMirror {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).wrap_err_with(|| {
                    format!("Failed to create mirror directory {}", dir.display())
                })?;
            }
        }
        Ok(JsonFileMirror { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentMirror for JsonFileMirror {
    fn load_snapshot(&self) -> Result<Option<EconomyState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).wrap_err_with(|| {
            format!("Failed to read economy mirror at {}", self.path.display())
        })?;
        if data.is_empty() {
            return Ok(None);
        }
        let file = serde_json::from_slice::<MirrorFile>(&data)
            .wrap_err("Failed to parse economy mirror JSON")?;
        Ok(Some(file.state))
    }

    fn save_snapshot(&self, state: &EconomyState) -> Result<()> {
        let file = MirrorFile {
            saved_at: Utc::now().to_rfc3339(),
            state: state.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .wrap_err("Failed to serialize economy mirror")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).wrap_err_with(|| {
            format!("Failed to write economy mirror at {}", tmp.display())
        })?;
        fs::rename(&tmp, &self.path)
            .wrap_err("Failed to move economy mirror into place")?;
        Ok(())
    }
}

/// Mirror for tests and ephemeral sessions; nothing survives the process.
#[derive(Clone, Default)]
pub struct InMemoryMirror {
    state: Arc<Mutex<Option<EconomyState>>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_state(state: EconomyState) -> Self {
        InMemoryMirror {
            state: Arc::new(Mutex::new(Some(state))),
        }
    }

    pub fn saved_state(&self) -> Option<EconomyState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PersistentMirror for InMemoryMirror {
    fn load_snapshot(&self) -> Result<Option<EconomyState>> {
        Ok(self.saved_state())
    }

    fn save_snapshot(&self, state: &EconomyState) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::CurrencyKind;
    use tempdir::TempDir;

    #[test]
    fn json_mirror__round_trips_state() {
        let dir = TempDir::new("satchel-mirror").unwrap();
        let mirror = JsonFileMirror::new(dir.path().join("economy.json")).unwrap();

        assert!(mirror.load_snapshot().unwrap().is_none());

        let mut state = EconomyState::default();
        state.balances.insert(CurrencyKind::Soft, 250);
        mirror.save_snapshot(&state).unwrap();

        let loaded = mirror.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn json_mirror__overwrites_previous_snapshot() {
        let dir = TempDir::new("satchel-mirror").unwrap();
        let mirror = JsonFileMirror::new(dir.path().join("economy.json")).unwrap();

        let mut first = EconomyState::default();
        first.balances.insert(CurrencyKind::Hard, 1);
        mirror.save_snapshot(&first).unwrap();

        let mut second = EconomyState::default();
        second.balances.insert(CurrencyKind::Hard, 2);
        mirror.save_snapshot(&second).unwrap();

        assert_eq!(mirror.load_snapshot().unwrap().unwrap(), second);
    }

    #[test]
    fn in_memory_mirror__shares_state_between_clones() {
        let mirror = InMemoryMirror::new();
        let clone = mirror.clone();

        let mut state = EconomyState::default();
        state.balances.insert(CurrencyKind::Event, 7);
        mirror.save_snapshot(&state).unwrap();

        assert_eq!(clone.load_snapshot().unwrap().unwrap(), state);
    }
}
