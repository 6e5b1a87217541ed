//! Capability registry
//!
//! Pure bookkeeping over named retrieval backends. The registry preserves
//! registration order, which the selector relies on for deterministic
//! fallback scanning.

use crate::capability::Capability;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Capability already registered: {0}")]
    Duplicate(String),

    #[error("Capability not registered: {0}")]
    Unknown(String),
}

/// Ordered, named store of retrieval capabilities
///
/// Constructed explicitly at startup and passed by reference to the
/// selector and dispatcher; there is no process-wide instance.
#[derive(Default)]
pub struct CapabilityRegistry {
    /// Capabilities in registration order
    entries: Vec<Arc<dyn Capability>>,

    /// Name of the default capability, if set
    default_name: Option<String>,
}

impl CapabilityRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability under its own name
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Registered
    /// * `Err(RegistryError::Duplicate)` - A capability with this name exists
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name().to_string();
        if self.has(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        tracing::debug!("Registering capability: {}", name);
        self.entries.push(capability);
        Ok(())
    }

    /// Removes a capability by name, returning whether it was present
    ///
    /// If the removed capability was the default, the default is cleared.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|c| c.name() != name);
        let removed = self.entries.len() != before;

        if removed && self.default_name.as_deref() == Some(name) {
            self.default_name = None;
        }
        removed
    }

    /// Looks up a capability by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.iter().find(|c| c.name() == name).cloned()
    }

    /// Returns all capabilities in registration order
    pub fn get_all(&self) -> Vec<Arc<dyn Capability>> {
        self.entries.clone()
    }

    /// Marks a registered capability as the default
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Default updated
    /// * `Err(RegistryError::Unknown)` - No capability with this name
    pub fn set_default(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.has(name) {
            return Err(RegistryError::Unknown(name.to_string()));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Returns the default capability, if one is set
    pub fn get_default(&self) -> Option<Arc<dyn Capability>> {
        self.default_name.as_deref().and_then(|n| self.get(n))
    }

    /// Whether a capability with this name is registered
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|c| c.name() == name)
    }

    /// Removes every capability and clears the default
    pub fn clear(&mut self) {
        self.entries.clear();
        self.default_name = None;
    }

    /// Number of registered capabilities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
