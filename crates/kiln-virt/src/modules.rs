//! # Module Map
//!
//! Translation from local module ids to the ids the server knows. The map
//! is built once when the client is created and never changes afterwards.

use hashbrown::HashMap;
use kiln_core::{Error, ModuleId, Result};

use crate::protocol::RemoteModuleId;

/// Local → remote module id table
#[derive(Debug, Clone, Default)]
pub struct ModuleMap {
    entries: HashMap<ModuleId, RemoteModuleId>,
}

impl ModuleMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Every module the server virtualizes
    ///
    /// ISP and VI exist twice; their second instance keeps its instance
    /// bits on the remote side.
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        map.insert(ModuleId::HOST, RemoteModuleId::HOST);
        map.insert(ModuleId::ISP, RemoteModuleId::ISP);
        map.insert(ModuleId::ISP.with_instance(1), RemoteModuleId::ISP.with_instance(1));
        map.insert(ModuleId::VI, RemoteModuleId::VI);
        map.insert(ModuleId::VI.with_instance(1), RemoteModuleId::VI.with_instance(1));
        map.insert(ModuleId::MSENC, RemoteModuleId::MSENC);
        map.insert(ModuleId::VIC, RemoteModuleId::VIC);
        map
    }

    /// Add or replace one entry
    pub fn insert(&mut self, local: ModuleId, remote: RemoteModuleId) -> &mut Self {
        self.entries.insert(local, remote);
        self
    }

    /// Translate a local id
    pub fn translate(&self, local: ModuleId) -> Result<RemoteModuleId> {
        match self.entries.get(&local) {
            Some(&remote) => Ok(remote),
            None => {
                log::error!("kiln: module {} not virtualized", local);
                Err(Error::UnsupportedModule(local))
            },
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check for an empty map
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
