use std::collections::BTreeMap;

use ulid::Ulid;

use super::job::{Job, JobPlanResponse, JobRegisterResponse};
use super::region::Region;

/// The persisted intent to register a job in a set of regions.
///
/// Plans are single-use: created by the planner, consumed at most once by the
/// registrar, then deleted whatever the outcome. The ULID gives plans a
/// time-ordered, URL-safe identity.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterPlan {
    pub id: Ulid,
    pub job: Job,
    pub regions: BTreeMap<String, JobRegisterRegionPlan>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterRegionPlan {
    pub region: String,
    pub plan: JobPlanResponse,
}

impl JobRegisterPlan {
    pub fn new(job: Job) -> JobRegisterPlan {
        JobRegisterPlan {
            id: Ulid::new(),
            job,
            regions: BTreeMap::new(),
        }
    }

    /// Attach a regional plan response. A region picked by more than one rule
    /// keeps the response of the rule processed last.
    pub fn add_region(&mut self, region: &Region, plan: JobPlanResponse) {
        self.regions.insert(
            region.name.clone(),
            JobRegisterRegionPlan {
                region: region.name.clone(),
                plan,
            },
        );
    }
}

/// The executed outcome of a plan, one entry per planned region.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterPlanRun {
    pub id: Ulid,
    pub job: Job,
    pub regions: BTreeMap<String, JobRegisterRegionPlanRun>,
}

/// Exactly one of `run` and `error` is set.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterRegionPlanRun {
    pub region: String,
    pub run: Option<JobRegisterResponse>,
    pub error: Option<String>,
}

impl JobRegisterPlanRun {
    pub fn new(job: Job) -> JobRegisterPlanRun {
        JobRegisterPlanRun {
            id: Ulid::new(),
            job,
            regions: BTreeMap::new(),
        }
    }

    pub fn add_region(&mut self, name: &str, result: Result<JobRegisterResponse, String>) {
        let entry = match result {
            Ok(resp) => JobRegisterRegionPlanRun {
                region: name.to_string(),
                run: Some(resp),
                error: None,
            },
            Err(e) => JobRegisterRegionPlanRun {
                region: name.to_string(),
                run: None,
                error: Some(e),
            },
        };
        self.regions.insert(name.to_string(), entry);
    }

    /// Names of the regions whose registration failed, in map order.
    pub fn failed_regions(&self) -> Vec<String> {
        self.regions
            .values()
            .filter(|r| r.error.is_some())
            .map(|r| r.region.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Region, RegionApi};
    use serde_json::json;

    fn job() -> Job {
        serde_json::from_value(json!({"ID": "svc", "Namespace": "platform"})).unwrap()
    }

    fn region(name: &str) -> Region {
        Region {
            name: name.into(),
            group: "eu".into(),
            auth: None,
            api: vec![RegionApi {
                address: format!("http://{}.example.com:4646", name),
                default: false,
            }],
            tls: None,
            metadata: None,
        }
    }

    fn plan_response(index: u64) -> JobPlanResponse {
        serde_json::from_value(json!({"JobModifyIndex": index})).unwrap()
    }

    #[test]
    fn plan_ids_sort_by_creation() {
        let a = JobRegisterPlan::new(job());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = JobRegisterPlan::new(job());
        assert!(a.id < b.id);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn plan_entry_key_matches_region_field() {
        let mut plan = JobRegisterPlan::new(job());
        plan.add_region(&region("euw1"), plan_response(3));

        let entry = plan.regions.get("euw1").unwrap();
        assert_eq!(entry.region, "euw1");
        assert_eq!(entry.plan.job_modify_index, 3);
    }

    #[test]
    fn plan_last_rule_wins() {
        let mut plan = JobRegisterPlan::new(job());
        plan.add_region(&region("euw1"), plan_response(3));
        plan.add_region(&region("euw1"), plan_response(9));

        assert_eq!(plan.regions.len(), 1);
        assert_eq!(plan.regions["euw1"].plan.job_modify_index, 9);
    }

    #[test]
    fn run_entries_are_exclusive() {
        let mut run = JobRegisterPlanRun::new(job());
        run.add_region(
            "euw1",
            Ok(serde_json::from_value(json!({"EvalID": "abc"})).unwrap()),
        );
        run.add_region("use1", Err("connection refused".into()));

        let ok = &run.regions["euw1"];
        assert!(ok.run.is_some() && ok.error.is_none());

        let bad = &run.regions["use1"];
        assert!(bad.run.is_none() && bad.error.is_some());

        assert_eq!(run.failed_regions(), vec!["use1".to_string()]);
    }

    #[test]
    fn plan_round_trips_through_json() {
        let mut plan = JobRegisterPlan::new(job());
        plan.add_region(&region("euw1"), plan_response(7));

        let doc = serde_json::to_string(&plan).unwrap();
        let decoded: JobRegisterPlan = serde_json::from_str(&doc).unwrap();
        assert_eq!(decoded.id, plan.id);
        assert_eq!(decoded.regions["euw1"].plan.job_modify_index, 7);
    }
}
