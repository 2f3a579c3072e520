use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{ErrorKind, Result};

use super::api;

/// The process-wide mapping from region name to its API client.
///
/// This is the only holder of per-region client instances; everything else
/// (planner, registrar, topology collectors) resolves clients through here
/// on each use so a region update takes effect immediately.
///
/// Lock note: guards are only held for the map operation itself, so a
/// poisoned lock means a panic mid-insert and the process is already lost.
#[derive(Clone, Default)]
pub struct Clients {
    clients: Arc<RwLock<HashMap<String, Arc<api::Client>>>>,
}

impl Clients {
    pub fn new() -> Clients {
        Clients::default()
    }

    pub fn set(&self, name: &str, client: api::Client) {
        self.clients
            .write()
            .unwrap()
            .insert(name.to_string(), Arc::new(client));
        debug!("created regional API client region_name={}", name);
    }

    pub fn get(&self, name: &str) -> Result<Arc<api::Client>> {
        self.clients
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ErrorKind::NoRegionClient(name.to_string()).into())
    }

    pub fn delete(&self, name: &str) {
        self.clients.write().unwrap().remove(name);
        debug!("deleted regional API client region_name={}", name);
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
