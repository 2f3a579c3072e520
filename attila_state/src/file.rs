use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use attila_definitions::{JobRegisterMethod, JobRegisterPlan, JobRegisterRule, Region};
use serde::de::DeserializeOwned;
use serde::Serialize;
use ulid::Ulid;
use walkdir::WalkDir;

use super::{
    MethodState, PlanState, RegionState, RuleState, State, StateError, StateResult,
};

const REGION_DIR: &str = "region";
const METHOD_DIR: &str = "job/registration/method";
const RULE_DIR: &str = "job/registration/rule";
const PLAN_DIR: &str = "job/registration/plan";

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// The durable backend: one JSON document per entity under a root directory,
/// replaced atomically on write. A single process-wide lock guards all
/// operations; the write rate is low enough that coarse is correct. Two
/// server processes must never share a root directory.
pub struct FileState {
    region_dir: PathBuf,
    method_dir: PathBuf,
    rule_dir: PathBuf,
    plan_dir: PathBuf,
    lock: RwLock<()>,
}

impl FileState {
    pub fn new(dir: &Path) -> attila_definitions::Result<FileState> {
        let state = FileState {
            region_dir: dir.join(REGION_DIR),
            method_dir: dir.join(METHOD_DIR),
            rule_dir: dir.join(RULE_DIR),
            plan_dir: dir.join(PLAN_DIR),
            lock: RwLock::new(()),
        };

        for sub_dir in [
            &state.region_dir,
            &state.method_dir,
            &state.rule_dir,
            &state.plan_dir,
        ]
        .iter()
        {
            match fs::metadata(sub_dir) {
                Ok(meta) if !meta.is_dir() => {
                    return Err(format!("state path '{}' is a file not a dir", sub_dir.display()).into());
                }
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // rwx so we can create entries and nested sub-dirs
                    DirBuilder::new()
                        .recursive(true)
                        .mode(DIR_MODE)
                        .create(sub_dir)
                        .map_err(|e| format!("failed to create state dir: {}", e))?;
                    debug!("created state dir {}", sub_dir.display());
                }
                Err(e) => {
                    return Err(format!("failed to stat state dir: {}", e).into());
                }
            }
        }

        Ok(state)
    }

    fn read(&self) -> StateResult<RwLockReadGuard<'_, ()>> {
        self.lock
            .read()
            .map_err(|e| StateError::internal(&format!("state lock poisoned: {}", e)))
    }

    fn write(&self) -> StateResult<RwLockWriteGuard<'_, ()>> {
        self.lock
            .write()
            .map_err(|e| StateError::internal(&format!("state lock poisoned: {}", e)))
    }
}

/// Atomically replace `path` by writing a temp file alongside it, syncing,
/// then renaming over the final name. The temp file is unlinked on any
/// failure before the rename.
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "state path has no parent dir"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "state path has no file name"))?;

    let tmp_path = dir.join(format!(
        "{}.tmp{}",
        file_name.to_string_lossy(),
        Ulid::new()
    ));

    let result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(data)?;
        file.set_permissions(Permissions::from_mode(FILE_MODE))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn create_store_file<T: Serialize>(path: &Path, obj: &T) -> StateResult<()> {
    match fs::metadata(path) {
        Ok(_) => return Err(StateError::bad_request("resource already exists")),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(StateError::internal(&e.to_string())),
    }

    let data = serde_json::to_vec(obj).map_err(|e| StateError::internal(&e.to_string()))?;
    atomic_write(path, &data).map_err(|e| StateError::internal(&e.to_string()))
}

fn get_store_file<T: DeserializeOwned>(path: &Path) -> StateResult<T> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StateError::not_found("resource not found"));
        }
        Err(e) => return Err(StateError::internal(&e.to_string())),
    };

    serde_json::from_slice(&data).map_err(|e| StateError::internal(&e.to_string()))
}

fn delete_store_file(path: &Path) -> StateResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(StateError::not_found("resource not found"))
        }
        Err(e) => Err(StateError::internal(&e.to_string())),
    }
}

/// Decode every `.json` entry directly below `dir`; other files and
/// sub-directories are skipped.
fn list_store_files<T: DeserializeOwned>(dir: &Path) -> StateResult<Vec<T>> {
    let mut out = vec![];

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| StateError::internal(&e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let data =
            fs::read(entry.path()).map_err(|e| StateError::internal(&e.to_string()))?;
        let obj =
            serde_json::from_slice(&data).map_err(|e| StateError::internal(&e.to_string()))?;
        out.push(obj);
    }

    Ok(out)
}

fn json_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

impl State for FileState {
    fn regions(&self) -> &dyn RegionState {
        self
    }
    fn methods(&self) -> &dyn MethodState {
        self
    }
    fn rules(&self) -> &dyn RuleState {
        self
    }
    fn plans(&self) -> &dyn PlanState {
        self
    }
    fn name(&self) -> &'static str {
        "file"
    }
}

impl RegionState for FileState {
    fn create(&self, region: Region) -> StateResult<Region> {
        let _guard = self.write()?;
        create_store_file(&json_path(&self.region_dir, &region.name), &region)?;
        Ok(region)
    }

    fn delete(&self, name: &str) -> StateResult<()> {
        let _guard = self.write()?;
        delete_store_file(&json_path(&self.region_dir, name))
    }

    fn get(&self, name: &str) -> StateResult<Region> {
        let _guard = self.read()?;
        get_store_file(&json_path(&self.region_dir, name))
    }

    fn list(&self) -> StateResult<Vec<Region>> {
        let _guard = self.read()?;
        list_store_files(&self.region_dir)
    }
}

impl MethodState for FileState {
    fn create(&self, method: JobRegisterMethod) -> StateResult<JobRegisterMethod> {
        let _guard = self.write()?;

        // Cross-table check under the same lock hold as the write.
        for link in &method.rules {
            if fs::metadata(json_path(&self.rule_dir, &link.name)).is_err() {
                return Err(StateError::bad_request(&format!(
                    "job register rule '{}' not found",
                    link.name
                )));
            }
        }

        create_store_file(&json_path(&self.method_dir, &method.name), &method)?;
        Ok(method)
    }

    fn delete(&self, name: &str) -> StateResult<()> {
        let _guard = self.write()?;
        delete_store_file(&json_path(&self.method_dir, name))
    }

    fn get(&self, name: &str) -> StateResult<JobRegisterMethod> {
        let _guard = self.read()?;
        get_store_file(&json_path(&self.method_dir, name))
    }

    fn list(&self) -> StateResult<Vec<JobRegisterMethod>> {
        let _guard = self.read()?;
        list_store_files(&self.method_dir)
    }
}

impl RuleState for FileState {
    fn create(&self, rule: JobRegisterRule) -> StateResult<JobRegisterRule> {
        let _guard = self.write()?;
        create_store_file(&json_path(&self.rule_dir, &rule.name), &rule)?;
        Ok(rule)
    }

    fn delete(&self, name: &str) -> StateResult<()> {
        let _guard = self.write()?;
        delete_store_file(&json_path(&self.rule_dir, name))
    }

    fn get(&self, name: &str) -> StateResult<JobRegisterRule> {
        let _guard = self.read()?;
        get_store_file(&json_path(&self.rule_dir, name))
    }

    fn list(&self) -> StateResult<Vec<JobRegisterRule>> {
        let _guard = self.read()?;
        list_store_files(&self.rule_dir)
    }
}

impl PlanState for FileState {
    fn create(&self, plan: JobRegisterPlan) -> StateResult<JobRegisterPlan> {
        let _guard = self.write()?;
        create_store_file(&json_path(&self.plan_dir, &plan.id.to_string()), &plan)?;
        Ok(plan)
    }

    fn delete(&self, id: &Ulid) -> StateResult<()> {
        let _guard = self.write()?;
        delete_store_file(&json_path(&self.plan_dir, &id.to_string()))
    }

    fn get(&self, id: &Ulid) -> StateResult<JobRegisterPlan> {
        let _guard = self.read()?;
        get_store_file(&json_path(&self.plan_dir, &id.to_string()))
    }

    fn list(&self) -> StateResult<Vec<JobRegisterPlan>> {
        let _guard = self.read()?;
        list_store_files(&self.plan_dir)
    }
}
