#![recursion_limit = "1024"]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;

extern crate chrono;
extern crate regex;
extern crate rhai;
extern crate ulid;
extern crate url;

#[macro_use]
extern crate log;

#[macro_use]
extern crate error_chain;
error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error) #[cfg(unix)];
        SerdeJ(serde_json::Error);
        Url(url::ParseError);
        UlidDecode(ulid::DecodeError);
    }
    errors {
        InvalidEntityName(name: String) {
            description("entity name does not validate")
            display("invalid name '{}' (lowercase alphanumerics, '-' and '_' only, max 64 chars)", name)
        }
        InvalidRegion(name: String) {
            description("region does not validate")
            display("region '{}' does not validate", name)
        }
        InvalidRule(name: String) {
            description("job register rule does not validate")
            display("job register rule '{}' does not validate", name)
        }
        InvalidMethod(name: String) {
            description("job register method does not validate")
            display("job register method '{}' does not validate", name)
        }
        ExpressionCompile(detail: String) {
            description("expression failed to compile")
            display("failed to compile expression: {}", detail)
        }
        ExpressionRun(detail: String) {
            description("expression failed to run")
            display("failed to run expression: {}", detail)
        }
        ExpressionType(expected: &'static str, actual: String) {
            description("expression returned incorrect type")
            display("expression returned incorrect type: want {}, got {}", expected, actual)
        }
    }
}

/// Shared create/update timestamps
pub mod metadata;
pub use crate::metadata::Metadata;

/// Region definitions and validation
pub mod region;
pub use crate::region::{Region, RegionApi, RegionAuth, RegionStub, RegionTls};

/// Job register rule definitions
pub mod rule;
pub use crate::rule::{
    JobRegisterRule, JobRegisterRuleExpression, JobRegisterRuleFilter, JobRegisterRulePicker,
    JobRegisterRuleStub, RuleRegionContext,
};

/// Job register method definitions
pub mod method;
pub use crate::method::{JobRegisterMethod, JobRegisterMethodRuleLink, JobRegisterMethodStub};

/// Job register plan and run objects
pub mod plan;
pub use crate::plan::{
    JobRegisterPlan, JobRegisterPlanRun, JobRegisterRegionPlan, JobRegisterRegionPlanRun,
};

/// Nomad wire objects attila passes through or consumes
pub mod job;
pub use crate::job::{Job, JobPlanResponse, JobRegisterResponse};

/// Region capacity topology objects
pub mod topology;
pub use crate::topology::{Topology, TopologyDetail, TopologyOverview};

/// Expression compilation and evaluation over a runtime context
pub mod expr;
pub use crate::expr::{Context, Program};

use regex::Regex;

/// Validate an entity name (regions, rules, methods share the scheme).
pub fn validate_name(name: &str) -> Result<()> {
    let re = Regex::new(r"^[0-9a-z][0-9a-z_-]{0,63}$").unwrap();
    if !re.is_match(name) {
        bail!(ErrorKind::InvalidEntityName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_name;

    #[test]
    fn name_validation() {
        assert!(validate_name("euw1").is_ok());
        assert!(validate_name("eu-west-1_canary").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("-leading-dash").is_err());
        assert!(validate_name("Uppercase").is_err());
        assert!(validate_name("spaces not ok").is_err());
    }
}
