use super::{expr, ErrorKind, Metadata, Result, ResultExt};

/// Per-region live data a rule wants hydrated into the expression context
/// before its filter runs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum RuleRegionContext {
    #[serde(rename = "namespace")]
    Namespace,
    #[serde(rename = "node-pool")]
    NodePool,
}

/// A region-filter plus region-picker pair.
///
/// The filter expression runs once per known region over `job`, `region` and
/// any hydrated context keys, and must yield a boolean. The picker runs once
/// over `regions` (the filtered set) and must yield a sequence of regions; a
/// rule without a picker picks nothing.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterRule {
    pub name: String,

    #[serde(default)]
    pub region_contexts: Vec<RuleRegionContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_filter: Option<JobRegisterRuleFilter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_picker: Option<JobRegisterRulePicker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterRuleFilter {
    pub expression: JobRegisterRuleExpression,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterRulePicker {
    pub expression: JobRegisterRuleExpression,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterRuleExpression {
    pub selector: String,
}

/// Compact rule representation returned by list endpoints.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterRuleStub {
    pub name: String,
    pub region_contexts: Vec<RuleRegionContext>,
}

impl JobRegisterRule {
    pub fn validate(&self) -> Result<()> {
        super::validate_name(&self.name).chain_err(|| ErrorKind::InvalidRule(self.name.clone()))?;

        if let Some(filter) = &self.region_filter {
            if filter.expression.selector.is_empty() {
                bail!("rule '{}': filter expression selector required", self.name);
            }
            expr::compile_bool(&filter.expression.selector)
                .chain_err(|| ErrorKind::InvalidRule(self.name.clone()))?;
        }

        if let Some(picker) = &self.region_picker {
            if picker.expression.selector.is_empty() {
                bail!("rule '{}': picker expression selector required", self.name);
            }
            expr::compile_slice(&picker.expression.selector)
                .chain_err(|| ErrorKind::InvalidRule(self.name.clone()))?;
        }

        Ok(())
    }

    pub fn stub(&self) -> JobRegisterRuleStub {
        JobRegisterRuleStub {
            name: self.name.clone(),
            region_contexts: self.region_contexts.clone(),
        }
    }
}
