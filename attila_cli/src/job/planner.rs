use attila_definitions::expr::{self, Context};
use attila_definitions::{Job, JobRegisterPlan, JobRegisterRule, Region, RuleRegionContext};
use attila_state::{MethodState, RegionState, RuleState, State};
use serde_json::Value;

use crate::nomad::{api, Clients};
use crate::{Result, ResultExt};

/// Builds a job register plan for one submitted job.
///
/// Methods select rules, rules filter and pick regions, and every picked
/// region is asked to dry-run the job so the plan captures its modify
/// index. Any failure along the way fails the whole plan; nothing has been
/// persisted at that point.
pub struct Planner<'a> {
    clients: &'a Clients,
    state: &'a dyn State,
    job: &'a Job,
}

impl<'a> Planner<'a> {
    pub fn new(clients: &'a Clients, state: &'a dyn State, job: &'a Job) -> Planner<'a> {
        Planner {
            clients,
            state,
            job,
        }
    }

    pub async fn run(&self) -> Result<JobRegisterPlan> {
        let methods = self.state.methods().list()?;
        if methods.is_empty() {
            bail!("found zero job register methods");
        }

        let job_value = serde_json::to_value(self.job)?;

        // Evaluate every method selector against the job; matching methods
        // contribute their rule links in order.
        let mut rule_links: Vec<String> = vec![];
        for method in &methods {
            let program = expr::compile_bool(&method.selector)
                .chain_err(|| "failed to compile method selector")?;
            let ctx = Context::new().set("job", job_value.clone());
            let matched = program
                .eval_bool(&ctx)
                .chain_err(|| "failed to run method selector")?;

            if matched {
                debug!(
                    "job matched register method job_id={} method={}",
                    self.job.id, method.name
                );
                rule_links.extend(method.rules.iter().map(|link| link.name.clone()));
            }
        }

        let mut rules: Vec<JobRegisterRule> = vec![];
        for link in &rule_links {
            let rule = self
                .state
                .rules()
                .get(link)
                .chain_err(|| format!("job registration rule not found: '{}'", link))?;
            rules.push(rule);
        }

        let regions = self.state.regions().list()?;

        let mut plan = JobRegisterPlan::new(self.job.clone());
        for rule in &rules {
            let filtered = self.run_rule_filter(rule, &regions, &job_value).await?;
            self.run_rule_picker(rule, filtered, &mut plan).await?;
        }

        Ok(plan)
    }

    /// Run the rule's filter over every known region, hydrating the
    /// region-local context the rule asks for. Regions passing the filter
    /// enter a name-deduplicated set preserving list order. A rule without
    /// a filter passes every region through.
    async fn run_rule_filter(
        &self,
        rule: &JobRegisterRule,
        regions: &[Region],
        job_value: &Value,
    ) -> Result<Vec<Region>> {
        let program = match &rule.region_filter {
            Some(filter) => Some(
                expr::compile_bool(&filter.expression.selector)
                    .chain_err(|| "failed to compile rule region filter")?,
            ),
            None => None,
        };

        let mut filtered: Vec<Region> = vec![];

        for region in regions {
            let passed = match &program {
                None => true,
                Some(program) => {
                    debug!(
                        "performing execution of rule region filter rule={} region_name={}",
                        rule.name, region.name
                    );

                    let client = self.clients.get(&region.name)?;

                    let mut ctx = Context::new()
                        .set("job", job_value.clone())
                        .set("region", serde_json::to_value(region)?);
                    ctx = self.populate_region_context(rule, &client, ctx).await?;

                    program
                        .eval_bool(&ctx)
                        .chain_err(|| "failed to run rule region filter")?
                }
            };

            if passed && !filtered.iter().any(|r| r.name == region.name) {
                debug!(
                    "region passed rule region filter rule={} region_name={}",
                    rule.name, region.name
                );
                filtered.push(region.clone());
            }
        }

        Ok(filtered)
    }

    async fn populate_region_context(
        &self,
        rule: &JobRegisterRule,
        client: &api::Client,
        mut ctx: Context,
    ) -> Result<Context> {
        for region_context in &rule.region_contexts {
            match region_context {
                RuleRegionContext::Namespace => {
                    let namespaces = client.namespace_list().await?;
                    ctx = ctx.set("region_namespace", Value::Array(namespaces));
                }
                RuleRegionContext::NodePool => {
                    let node_pools = client.node_pool_list().await?;
                    ctx = ctx.set("region_nodepool", Value::Array(node_pools));
                }
            }
        }
        Ok(ctx)
    }

    /// Run the picker over the filtered set and realize a regional plan for
    /// every picked region. A rule without a picker picks nothing.
    async fn run_rule_picker(
        &self,
        rule: &JobRegisterRule,
        filtered: Vec<Region>,
        plan: &mut JobRegisterPlan,
    ) -> Result<()> {
        let picker = match &rule.region_picker {
            Some(picker) => picker,
            None => return Ok(()),
        };

        debug!(
            "performing execution of rule region picker rule={} num_regions={}",
            rule.name,
            filtered.len()
        );

        let program = expr::compile_slice(&picker.expression.selector)
            .chain_err(|| "failed to compile picker expression selector")?;
        let ctx = Context::new().set("regions", serde_json::to_value(&filtered)?);

        let picked = program
            .eval_slice(&ctx)
            .chain_err(|| "failed to run picker expression selector")?;

        for value in picked {
            let region: Region = serde_json::from_value(value)
                .chain_err(|| "picker expression selector returned incorrect type")?;

            let client = self.clients.get(&region.name)?;
            let plan_resp = client
                .job_plan(self.job)
                .await
                .chain_err(|| "failed to call regional job plan")?;

            info!(
                "region picked by rule picker rule={} region_name={} job_modify_index={}",
                rule.name, region.name, plan_resp.job_modify_index
            );
            plan.add_region(&region, plan_resp);
        }

        Ok(())
    }
}
