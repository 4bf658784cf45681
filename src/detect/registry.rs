use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::result::DetectorOutput;
use crate::frame::Frame;

use super::backend::DetectorBackend;

/// Shared handle to a backend. The mutex scopes exclusive use to one call.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Named detector backends with a default.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the default backend on a frame.
    pub fn detect(&self, frame: &Frame) -> Result<DetectorOutput> {
        self.with_default(|backend| backend.detect(frame))
    }

    /// Run the default backend's warm-up hook.
    pub fn warm_up(&self) -> Result<()> {
        self.with_default(|backend| backend.warm_up())
    }

    fn with_default<T>(&self, f: impl FnOnce(&mut dyn DetectorBackend) -> Result<T>) -> Result<T> {
        let backend = self
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))?;
        f(&mut *guard)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
