use attila_definitions::{Job, JobRegisterPlanRun};
use attila_state::{PlanState, State};
use ulid::Ulid;

use crate::nomad::Clients;
use crate::Result;

/// Executes a persisted plan: one registration attempt per planned region,
/// each asserting the modify index captured at plan time.
///
/// Region failures are recorded and do not stop the remaining regions; the
/// caller receives the full aggregate plus an optional partial-failure
/// message. Plans are single-use and are deleted whatever the outcome.
pub struct Register<'a> {
    clients: &'a Clients,
    state: &'a dyn State,
    job: &'a Job,
    plan_id: Ulid,
}

impl<'a> Register<'a> {
    pub fn new(
        clients: &'a Clients,
        state: &'a dyn State,
        job: &'a Job,
        plan_id: Ulid,
    ) -> Register<'a> {
        Register {
            clients,
            state,
            job,
            plan_id,
        }
    }

    pub async fn run(&self) -> Result<(JobRegisterPlanRun, Option<String>)> {
        let plan = self.state.plans().get(&self.plan_id)?;

        let mut run = JobRegisterPlanRun::new(self.job.clone());

        for (region_name, region_plan) in &plan.regions {
            let modify_index = region_plan.plan.job_modify_index;

            info!(
                "regional job register started plan_id={} region_name={} job_modify_index={}",
                self.plan_id, region_name, modify_index
            );

            let result = match self.clients.get(region_name) {
                Err(e) => Err(e.to_string()),
                Ok(client) => client
                    .job_register(self.job, modify_index)
                    .await
                    .map_err(|e| crate::error_chain_text(&e)),
            };

            match &result {
                Ok(resp) => info!(
                    "regional job register successful plan_id={} region_name={} eval_id={}",
                    self.plan_id, region_name, resp.eval_id
                ),
                Err(e) => error!(
                    "regional job register failed plan_id={} region_name={} error={}",
                    self.plan_id, region_name, e
                ),
            }

            run.add_region(region_name, result);
        }

        let failed = run.failed_regions();
        let partial_failure = if failed.is_empty() {
            None
        } else {
            Some(format!(
                "job register failed in regions: {}",
                failed.join(", ")
            ))
        };

        // Single-use: remove the plan whatever happened above. A failed
        // delete must not change the response the operator sees.
        if let Err(e) = self.state.plans().delete(&self.plan_id) {
            error!(
                "failed to delete job register plan plan_id={} error={}",
                self.plan_id, e
            );
        }

        Ok((run, partial_failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attila_definitions::{JobPlanResponse, JobRegisterPlan, Region, RegionApi};
    use attila_state::MemState;
    use mockito::mock;
    use serde_json::json;

    use crate::nomad::api;

    fn job() -> Job {
        serde_json::from_value(json!({"ID": "svc", "Namespace": "platform"})).unwrap()
    }

    fn region(name: &str, address: &str) -> Region {
        Region {
            name: name.into(),
            group: "eu".into(),
            auth: None,
            api: vec![RegionApi {
                address: address.into(),
                default: true,
            }],
            tls: None,
            metadata: None,
        }
    }

    fn plan_response(index: u64) -> JobPlanResponse {
        serde_json::from_value(json!({"JobModifyIndex": index})).unwrap()
    }

    fn seed_plan(state: &MemState, regions: Vec<&Region>) -> Ulid {
        let mut plan = JobRegisterPlan::new(job());
        for region in regions {
            plan.add_region(region, plan_response(42));
        }
        let id = plan.id;
        state.plans().create(plan).unwrap();
        id
    }

    #[actix_rt::test]
    async fn missing_plan_is_not_found() {
        let state = MemState::new();
        let clients = Clients::new();
        let job = job();

        let err = Register::new(&clients, &state, &job, Ulid::new())
            .run()
            .await
            .unwrap_err();
        match err.kind() {
            crate::ErrorKind::State(se) => assert_eq!(se.code, 404),
            other => panic!("unexpected error kind: {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn run_success_deletes_plan() {
        let _m = mock("PUT", "/v1/jobs")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"EvalID": "7b4", "JobModifyIndex": 43}"#)
            .create();

        let state = MemState::new();
        let euw1 = region("euw1", &mockito::server_url());
        let plan_id = seed_plan(&state, vec![&euw1]);

        let clients = Clients::new();
        clients.set("euw1", api::Client::new(&euw1).unwrap());

        let job = job();
        let (run, partial) = Register::new(&clients, &state, &job, plan_id)
            .run()
            .await
            .unwrap();

        assert!(partial.is_none());
        let entry = run.regions.get("euw1").unwrap();
        assert!(entry.run.is_some());
        assert!(entry.error.is_none());

        // consumed: a second run cannot find the plan
        assert_eq!(state.plans().get(&plan_id).unwrap_err().code, 404);
    }

    #[actix_rt::test]
    async fn partial_failure_keeps_going() {
        let _m = mock("PUT", "/v1/jobs")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"EvalID": "7b4", "JobModifyIndex": 43}"#)
            .create();

        let state = MemState::new();
        let euw1 = region("euw1", &mockito::server_url());
        // use1 has a plan entry but no client in the registry
        let use1 = region("use1", "http://127.0.0.1:1");
        let plan_id = seed_plan(&state, vec![&euw1, &use1]);

        let clients = Clients::new();
        clients.set("euw1", api::Client::new(&euw1).unwrap());

        let job = job();
        let (run, partial) = Register::new(&clients, &state, &job, plan_id)
            .run()
            .await
            .unwrap();

        assert_eq!(run.regions.len(), 2);
        assert!(run.regions["euw1"].run.is_some());
        assert!(run.regions["use1"].error.is_some());

        let partial = partial.expect("partial failure expected");
        assert!(partial.contains("use1"));

        // the plan is deleted even on partial failure
        assert_eq!(state.plans().get(&plan_id).unwrap_err().code, 404);
    }

    #[actix_rt::test]
    async fn stale_modify_index_recorded_per_region() {
        // The region rejects the enforce-index write the way Nomad does.
        let _m = mock("PUT", "/v1/jobs")
            .with_status(500)
            .with_body("Enforcing job modify index 42: job exists with conflicting job modify index: 45")
            .create();

        let state = MemState::new();
        let euw1 = region("euw1", &mockito::server_url());
        let plan_id = seed_plan(&state, vec![&euw1]);

        let clients = Clients::new();
        clients.set("euw1", api::Client::new(&euw1).unwrap());

        let job = job();
        let (run, partial) = Register::new(&clients, &state, &job, plan_id)
            .run()
            .await
            .unwrap();

        let entry = run.regions.get("euw1").unwrap();
        assert!(entry.run.is_none());
        assert!(entry
            .error
            .as_ref()
            .unwrap()
            .contains("conflicting job modify index"));
        assert!(partial.is_some());
    }
}
