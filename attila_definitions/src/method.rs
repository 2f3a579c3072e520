use super::{expr, ErrorKind, Metadata, Result, ResultExt};

/// A rule-selecting predicate over a submitted job.
///
/// When the selector evaluates true for a job, the linked rules take part in
/// planning in link order. Every linked rule must exist when the method is
/// created; the state store enforces this inside its transaction.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterMethod {
    pub name: String,

    /// Boolean program evaluated over `{job}`
    pub selector: String,

    #[serde(rename = "rule")]
    pub rules: Vec<JobRegisterMethodRuleLink>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterMethodRuleLink {
    pub name: String,
}

/// Compact method representation returned by list endpoints.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterMethodStub {
    pub name: String,
    pub selector: String,
}

impl JobRegisterMethod {
    pub fn validate(&self) -> Result<()> {
        super::validate_name(&self.name)
            .chain_err(|| ErrorKind::InvalidMethod(self.name.clone()))?;

        if self.rules.is_empty() {
            bail!("method '{}': at least one rule required", self.name);
        }
        for (i, link) in self.rules.iter().enumerate() {
            if link.name.is_empty() {
                bail!("method '{}': rule {} name required", self.name, i);
            }
        }

        if !self.selector.is_empty() {
            expr::compile_bool(&self.selector)
                .chain_err(|| ErrorKind::InvalidMethod(self.name.clone()))?;
        }

        Ok(())
    }

    pub fn stub(&self) -> JobRegisterMethodStub {
        JobRegisterMethodStub {
            name: self.name.clone(),
            selector: self.selector.clone(),
        }
    }
}
