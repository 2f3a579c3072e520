use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use attila_definitions::{JobRegisterMethod, JobRegisterPlan, JobRegisterRule, Region};
use ulid::Ulid;

use super::{
    MethodState, PlanState, RegionState, RuleState, State, StateError, StateResult,
};

#[derive(Default)]
struct Tables {
    regions: BTreeMap<String, Region>,
    methods: BTreeMap<String, JobRegisterMethod>,
    rules: BTreeMap<String, JobRegisterRule>,
    plans: BTreeMap<Ulid, JobRegisterPlan>,

    // Secondary (namespace, job_id) plan index. Nothing queries it yet; it is
    // maintained so job-scoped lookups can be added without a migration.
    plans_by_job: BTreeMap<(String, String), Ulid>,
}

/// The in-memory backend: four tables behind one process-wide lock. Writes
/// are exclusive and commit atomically under the guard; nothing persists
/// across a restart.
#[derive(Default)]
pub struct MemState {
    tables: RwLock<Tables>,
}

impl MemState {
    pub fn new() -> MemState {
        MemState::default()
    }

    fn read(&self) -> StateResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| StateError::internal(&format!("state lock poisoned: {}", e)))
    }

    fn write(&self) -> StateResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| StateError::internal(&format!("state lock poisoned: {}", e)))
    }
}

impl State for MemState {
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
        "mem"
    }
}

impl RegionState for MemState {
    fn create(&self, region: Region) -> StateResult<Region> {
        let mut tables = self.write()?;
        if tables.regions.contains_key(&region.name) {
            return Err(StateError::bad_request(&format!(
                "region '{}' already exists",
                region.name
            )));
        }
        tables.regions.insert(region.name.clone(), region.clone());
        Ok(region)
    }

    fn delete(&self, name: &str) -> StateResult<()> {
        let mut tables = self.write()?;
        if tables.regions.remove(name).is_none() {
            return Err(StateError::not_found(&format!(
                "region '{}' not found",
                name
            )));
        }
        Ok(())
    }

    fn get(&self, name: &str) -> StateResult<Region> {
        let tables = self.read()?;
        tables
            .regions
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::not_found(&format!("region '{}' not found", name)))
    }

    fn list(&self) -> StateResult<Vec<Region>> {
        let tables = self.read()?;
        Ok(tables.regions.values().cloned().collect())
    }
}

impl MethodState for MemState {
    fn create(&self, method: JobRegisterMethod) -> StateResult<JobRegisterMethod> {
        let mut tables = self.write()?;
        if tables.methods.contains_key(&method.name) {
            return Err(StateError::bad_request(&format!(
                "job register method '{}' already exists",
                method.name
            )));
        }

        // Linked rules must resolve within the same transaction scope.
        for link in &method.rules {
            if !tables.rules.contains_key(&link.name) {
                return Err(StateError::bad_request(&format!(
                    "job register rule '{}' not found",
                    link.name
                )));
            }
        }

        tables.methods.insert(method.name.clone(), method.clone());
        Ok(method)
    }

    fn delete(&self, name: &str) -> StateResult<()> {
        let mut tables = self.write()?;
        if tables.methods.remove(name).is_none() {
            return Err(StateError::not_found(&format!(
                "job register method '{}' not found",
                name
            )));
        }
        Ok(())
    }

    fn get(&self, name: &str) -> StateResult<JobRegisterMethod> {
        let tables = self.read()?;
        tables.methods.get(name).cloned().ok_or_else(|| {
            StateError::not_found(&format!("job register method '{}' not found", name))
        })
    }

    fn list(&self) -> StateResult<Vec<JobRegisterMethod>> {
        let tables = self.read()?;
        Ok(tables.methods.values().cloned().collect())
    }
}

impl RuleState for MemState {
    fn create(&self, rule: JobRegisterRule) -> StateResult<JobRegisterRule> {
        let mut tables = self.write()?;
        if tables.rules.contains_key(&rule.name) {
            return Err(StateError::bad_request(&format!(
                "job register rule '{}' already exists",
                rule.name
            )));
        }
        tables.rules.insert(rule.name.clone(), rule.clone());
        Ok(rule)
    }

    fn delete(&self, name: &str) -> StateResult<()> {
        let mut tables = self.write()?;
        if tables.rules.remove(name).is_none() {
            return Err(StateError::not_found(&format!(
                "job register rule '{}' not found",
                name
            )));
        }
        Ok(())
    }

    fn get(&self, name: &str) -> StateResult<JobRegisterRule> {
        let tables = self.read()?;
        tables.rules.get(name).cloned().ok_or_else(|| {
            StateError::not_found(&format!("job register rule '{}' not found", name))
        })
    }

    fn list(&self) -> StateResult<Vec<JobRegisterRule>> {
        let tables = self.read()?;
        Ok(tables.rules.values().cloned().collect())
    }
}

impl PlanState for MemState {
    fn create(&self, plan: JobRegisterPlan) -> StateResult<JobRegisterPlan> {
        let mut tables = self.write()?;
        if tables.plans.contains_key(&plan.id) {
            return Err(StateError::bad_request(&format!(
                "job register plan '{}' already exists",
                plan.id
            )));
        }
        tables.plans_by_job.insert(
            (plan.job.namespace.clone(), plan.job.id.clone()),
            plan.id,
        );
        tables.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    fn delete(&self, id: &Ulid) -> StateResult<()> {
        let mut tables = self.write()?;
        match tables.plans.remove(id) {
            Some(plan) => {
                tables
                    .plans_by_job
                    .remove(&(plan.job.namespace.clone(), plan.job.id.clone()));
                Ok(())
            }
            None => Err(StateError::not_found(&format!(
                "job register plan '{}' not found",
                id
            ))),
        }
    }

    fn get(&self, id: &Ulid) -> StateResult<JobRegisterPlan> {
        let tables = self.read()?;
        tables.plans.get(id).cloned().ok_or_else(|| {
            StateError::not_found(&format!("job register plan '{}' not found", id))
        })
    }

    fn list(&self) -> StateResult<Vec<JobRegisterPlan>> {
        let tables = self.read()?;
        Ok(tables.plans.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attila_definitions::{
        Job, JobRegisterMethodRuleLink, RegionApi,
    };
    use serde_json::json;

    fn region(name: &str) -> Region {
        Region {
            name: name.into(),
            group: "eu".into(),
            auth: None,
            api: vec![RegionApi {
                address: format!("http://{}.example.com:4646", name),
                default: true,
            }],
            tls: None,
            metadata: None,
        }
    }

    fn rule(name: &str) -> JobRegisterRule {
        JobRegisterRule {
            name: name.into(),
            region_contexts: vec![],
            region_filter: None,
            region_picker: None,
            metadata: None,
        }
    }

    fn method(name: &str, rules: Vec<&str>) -> JobRegisterMethod {
        JobRegisterMethod {
            name: name.into(),
            selector: "true".into(),
            rules: rules
                .into_iter()
                .map(|n| JobRegisterMethodRuleLink { name: n.into() })
                .collect(),
            metadata: None,
        }
    }

    fn job() -> Job {
        serde_json::from_value(json!({"ID": "svc", "Namespace": "platform"})).unwrap()
    }

    #[test]
    fn region_create_get_round_trip() {
        let state = MemState::new();
        state.regions().create(region("euw1")).unwrap();

        let fetched = state.regions().get("euw1").unwrap();
        assert_eq!(fetched.name, "euw1");
        assert_eq!(fetched.group, "eu");
    }

    #[test]
    fn region_duplicate_create() {
        let state = MemState::new();
        state.regions().create(region("euw1")).unwrap();

        let err = state.regions().create(region("euw1")).unwrap_err();
        assert_eq!(err.code, 400);
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn region_delete_then_missing() {
        let state = MemState::new();
        state.regions().create(region("euw1")).unwrap();
        state.regions().delete("euw1").unwrap();

        assert_eq!(state.regions().get("euw1").unwrap_err().code, 404);
        assert_eq!(state.regions().delete("euw1").unwrap_err().code, 404);
    }

    #[test]
    fn region_list() {
        let state = MemState::new();
        state.regions().create(region("euw1")).unwrap();
        state.regions().create(region("use1")).unwrap();

        let regions = state.regions().list().unwrap();
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn method_create_requires_linked_rules() {
        let state = MemState::new();

        let err = state.methods().create(method("m1", vec!["r1"])).unwrap_err();
        assert_eq!(err.code, 400);
        assert!(err.message.contains("not found"));

        state.rules().create(rule("r1")).unwrap();
        assert!(state.methods().create(method("m1", vec!["r1"])).is_ok());
    }

    #[test]
    fn plan_crud_and_job_index() {
        let state = MemState::new();
        let plan = JobRegisterPlan::new(job());
        let id = plan.id;

        state.plans().create(plan).unwrap();
        assert_eq!(state.plans().get(&id).unwrap().job.id, "svc");
        assert_eq!(state.plans().list().unwrap().len(), 1);

        {
            let tables = state.tables.read().unwrap();
            assert_eq!(
                tables.plans_by_job.get(&("platform".into(), "svc".into())),
                Some(&id)
            );
        }

        state.plans().delete(&id).unwrap();
        assert_eq!(state.plans().get(&id).unwrap_err().code, 404);
        assert!(state.tables.read().unwrap().plans_by_job.is_empty());
    }

    #[test]
    fn backend_tag() {
        assert_eq!(MemState::new().name(), "mem");
    }
}
