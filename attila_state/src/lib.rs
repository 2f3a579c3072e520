#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;

#[macro_use]
extern crate log;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use attila_definitions::{
    JobRegisterMethod, JobRegisterPlan, JobRegisterRule, Region,
};
use ulid::Ulid;

/// Memory backend: a transactional in-process table set
pub mod mem;
pub use crate::mem::MemState;

/// File backend: one JSON document per entity with atomic replacement
pub mod file;
pub use crate::file::FileState;

/// A structured store error whose code is HTTP-shaped so handlers can map it
/// straight onto a response status: 400 duplicate/validation, 404 missing,
/// 500 backend failure.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StateError {
    pub message: String,
    pub code: u16,
}

impl StateError {
    pub fn bad_request(message: &str) -> StateError {
        StateError {
            message: message.to_string(),
            code: 400,
        }
    }

    pub fn not_found(message: &str) -> StateError {
        StateError {
            message: message.to_string(),
            code: 404,
        }
    }

    pub fn internal(message: &str) -> StateError {
        StateError {
            message: message.to_string(),
            code: 500,
        }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state: {}", self.message)
    }
}

impl std::error::Error for StateError {}

pub type StateResult<T> = Result<T, StateError>;

/// Region CRUD keyed by name.
pub trait RegionState: Send + Sync {
    fn create(&self, region: Region) -> StateResult<Region>;
    fn delete(&self, name: &str) -> StateResult<()>;
    fn get(&self, name: &str) -> StateResult<Region>;
    fn list(&self) -> StateResult<Vec<Region>>;
}

/// Job register method CRUD keyed by name.
///
/// Create performs the cross-table invariant check: every linked rule must
/// resolve within the store at creation time.
pub trait MethodState: Send + Sync {
    fn create(&self, method: JobRegisterMethod) -> StateResult<JobRegisterMethod>;
    fn delete(&self, name: &str) -> StateResult<()>;
    fn get(&self, name: &str) -> StateResult<JobRegisterMethod>;
    fn list(&self) -> StateResult<Vec<JobRegisterMethod>>;
}

/// Job register rule CRUD keyed by name.
pub trait RuleState: Send + Sync {
    fn create(&self, rule: JobRegisterRule) -> StateResult<JobRegisterRule>;
    fn delete(&self, name: &str) -> StateResult<()>;
    fn get(&self, name: &str) -> StateResult<JobRegisterRule>;
    fn list(&self) -> StateResult<Vec<JobRegisterRule>>;
}

/// Job register plan CRUD keyed by ULID.
pub trait PlanState: Send + Sync {
    fn create(&self, plan: JobRegisterPlan) -> StateResult<JobRegisterPlan>;
    fn delete(&self, id: &Ulid) -> StateResult<()>;
    fn get(&self, id: &Ulid) -> StateResult<JobRegisterPlan>;
    fn list(&self) -> StateResult<Vec<JobRegisterPlan>>;
}

/// The capability surface shared by every backend.
pub trait State: Send + Sync {
    fn regions(&self) -> &dyn RegionState;
    fn methods(&self) -> &dyn MethodState;
    fn rules(&self) -> &dyn RuleState;
    fn plans(&self) -> &dyn PlanState;

    /// Short backend tag used in logs
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Backend selection config

/// The `state {}` config block. Exactly one backend must be enabled.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub memory: Option<MemoryConfig>,
    #[serde(default)]
    pub file: Option<FileConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            memory: Some(MemoryConfig {
                enabled: Some(true),
            }),
            file: None,
        }
    }
}

impl Config {
    fn memory_enabled(&self) -> bool {
        self.memory
            .as_ref()
            .and_then(|m| m.enabled)
            .unwrap_or(false)
    }

    fn file_enabled(&self) -> bool {
        self.file.as_ref().and_then(|f| f.enabled).unwrap_or(false)
    }

    pub fn validate(&self) -> attila_definitions::Result<()> {
        match (self.memory_enabled(), self.file_enabled()) {
            (true, true) => Err("state config can only enable one backend".into()),
            (false, false) => Err("state config must enable exactly one backend".into()),
            (false, true) => {
                let file = self.file.as_ref().unwrap();
                match &file.path {
                    Some(path) if path.is_absolute() => Ok(()),
                    Some(path) => Err(format!(
                        "state file path '{}' must be absolute",
                        path.display()
                    )
                    .into()),
                    None => Err("state file path required".into()),
                }
            }
            (true, false) => Ok(()),
        }
    }

    /// Merge another config over this one; set fields in `z` win.
    pub fn merge(&self, z: &Config) -> Config {
        let mut result = self.clone();

        if let Some(memory) = &z.memory {
            let base = result.memory.get_or_insert(MemoryConfig { enabled: None });
            if memory.enabled.is_some() {
                base.enabled = memory.enabled;
            }
        }
        if let Some(file) = &z.file {
            let base = result.file.get_or_insert(FileConfig {
                enabled: None,
                path: None,
            });
            if file.enabled.is_some() {
                base.enabled = file.enabled;
            }
            if file.path.is_some() {
                base.path = file.path.clone();
            }
        }

        result
    }
}

/// Construct the configured backend. The config must already validate.
pub fn from_config(cfg: &Config) -> attila_definitions::Result<Arc<dyn State>> {
    cfg.validate()?;

    if cfg.file_enabled() {
        let path = cfg.file.as_ref().and_then(|f| f.path.clone()).unwrap();
        let store = FileState::new(&path)?;
        info!("configured file state backend at {}", path.display());
        return Ok(Arc::new(store));
    }

    info!("configured memory state backend");
    Ok(Arc::new(MemState::new()))
}
