//! UI preference flags. Loaded once at startup, changed only by explicit user
//! actions, written back atomically after every change.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiPreferences {
    pub chat_prompt_dismissed: bool,
    pub onboarding_complete: bool,
}

impl UiPreferences {
    /// The chat prompt is offered once a wallet is connected, until dismissed.
    pub fn chat_prompt_visible(&self, is_connected: bool) -> bool {
        is_connected && !self.chat_prompt_dismissed
    }
}

#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    current: Mutex<UiPreferences>,
}

impl PreferenceStore {
    /// Reads `path`; a missing file yields defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UiPreferences::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Loaded preferences from {}: {:?}", path.display(), current);
        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> UiPreferences {
        match self.current.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn chat_prompt_visible(&self, is_connected: bool) -> bool {
        self.snapshot().chat_prompt_visible(is_connected)
    }

    pub fn dismiss_chat_prompt(&self) -> Result<()> {
        self.update(|p| p.chat_prompt_dismissed = true)
    }

    pub fn reset_chat_prompt(&self) -> Result<()> {
        self.update(|p| p.chat_prompt_dismissed = false)
    }

    pub fn complete_onboarding(&self) -> Result<()> {
        self.update(|p| p.onboarding_complete = true)
    }

    pub fn reset_onboarding(&self) -> Result<()> {
        self.update(|p| p.onboarding_complete = false)
    }

    fn update(&self, change: impl FnOnce(&mut UiPreferences)) -> Result<()> {
        let mut guard = self
            .current
            .lock()
            .map_err(|_| AgentError::Internal("preference lock poisoned".into()))?;
        let mut next = *guard;
        change(&mut next);
        persist(&self.path, &next)?;
        *guard = next;
        Ok(())
    }
}

/// Writes to a temp file in the same directory, then renames over `path`.
fn persist(path: &Path, prefs: &UiPreferences) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(serde_json::to_string_pretty(prefs)?.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| AgentError::Io(e.error))?;
    tracing::debug!("Persisted preferences to {}", path.display());
    Ok(())
}

static PREFERENCES: OnceLock<PreferenceStore> = OnceLock::new();

/// Loads the process-wide store. Later calls return the store installed first.
pub fn init(path: impl Into<PathBuf>) -> Result<&'static PreferenceStore> {
    if let Some(store) = PREFERENCES.get() {
        return Ok(store);
    }
    let store = PreferenceStore::load(path)?;
    Ok(PREFERENCES.get_or_init(|| store))
}

pub fn get() -> Option<&'static PreferenceStore> {
    PREFERENCES.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::load(dir.path().join("prefs.json")).unwrap();
        assert_eq!(store.snapshot(), UiPreferences::default());
        assert!(store.chat_prompt_visible(true));
        assert!(!store.chat_prompt_visible(false));
    }

    #[test]
    fn test_flags_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let store = PreferenceStore::load(&path).unwrap();
        store.dismiss_chat_prompt().unwrap();
        store.complete_onboarding().unwrap();

        let reloaded = PreferenceStore::load(&path).unwrap();
        assert!(reloaded.snapshot().chat_prompt_dismissed);
        assert!(reloaded.snapshot().onboarding_complete);
        assert!(!reloaded.chat_prompt_visible(true));

        reloaded.reset_chat_prompt().unwrap();
        reloaded.reset_onboarding().unwrap();
        let again = PreferenceStore::load(&path).unwrap();
        assert_eq!(again.snapshot(), UiPreferences::default());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"chat_prompt_dismissed":true,"theme":"dark"}"#).unwrap();
        let store = PreferenceStore::load(&path).unwrap();
        assert!(store.snapshot().chat_prompt_dismissed);
        assert!(!store.snapshot().onboarding_complete);
    }
}
