//! Live-updatable runtime settings injected into the core components.
//!
//! Holds the two service credentials and the mute flag. The core never reads
//! these from disk or the environment; the application builds a [`Settings`]
//! (usually from [`crate::config::Config`]) and shares it via `Arc`.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Credentials and mute state shared by the pipeline components.
#[derive(Debug, Default)]
pub struct Settings {
    description_key: RwLock<String>,
    narration_key: RwLock<String>,
    muted: AtomicBool,
}

impl Settings {
    pub fn new(description_key: &str, narration_key: &str) -> Self {
        Self {
            description_key: RwLock::new(description_key.to_string()),
            narration_key: RwLock::new(narration_key.to_string()),
            muted: AtomicBool::new(false),
        }
    }

    pub fn with_muted(self, muted: bool) -> Self {
        self.muted.store(muted, Ordering::SeqCst);
        self
    }

    /// Description-service key, or `None` when unset or blank.
    pub fn description_key(&self) -> Option<String> {
        read_key(&self.description_key)
    }

    /// Narration-service key, or `None` when unset or blank.
    pub fn narration_key(&self) -> Option<String> {
        read_key(&self.narration_key)
    }

    pub fn set_description_key(&self, key: &str) {
        write_key(&self.description_key, key);
    }

    pub fn set_narration_key(&self, key: &str) {
        write_key(&self.narration_key, key);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Set the mute flag, returning the previous value.
    pub fn set_muted(&self, muted: bool) -> bool {
        self.muted.swap(muted, Ordering::SeqCst)
    }
}

fn read_key(lock: &RwLock<String>) -> Option<String> {
    // A poisoned lock still holds a valid String.
    let key = match lock.read() {
        Ok(guard) => guard.trim().to_string(),
        Err(poisoned) => poisoned.into_inner().trim().to_string(),
    };
    if key.is_empty() { None } else { Some(key) }
}

fn write_key(lock: &RwLock<String>, key: &str) {
    match lock.write() {
        Ok(mut guard) => *guard = key.to_string(),
        Err(poisoned) => *poisoned.into_inner() = key.to_string(),
    }
}
