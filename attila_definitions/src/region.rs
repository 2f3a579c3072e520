use std::collections::BTreeSet;

use url::Url;

use super::{ErrorKind, Metadata, Result, ResultExt};

/// A named workload-orchestrator cell addressable by one or more API
/// endpoints.
///
/// Regions are created and deleted through the attila API only; the server
/// propagates lifecycle events to the client registry and the topology
/// collectors.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Region {
    /// Unique region name
    pub name: String,

    /// Operator grouping, used by rule expressions ("eu", "staging", ...)
    #[serde(default)]
    pub group: String,

    /// Optional bearer token passed to the region API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RegionAuth>,

    /// API endpoints; at least one, at most one marked default
    pub api: Vec<RegionApi>,

    /// Optional TLS material for the region API transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RegionTls>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegionAuth {
    pub token: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegionApi {
    pub address: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegionTls {
    /// Path to a PEM encoded CA certificate
    #[serde(default)]
    pub ca_cert: String,
    /// Path to a PEM encoded client certificate
    #[serde(default)]
    pub client_cert: String,
    /// Path to a PEM encoded client key
    #[serde(default)]
    pub client_key: String,
    /// Expected server name; stored for operators, see client construction
    #[serde(default)]
    pub server_name: String,
    /// Skip certificate verification
    #[serde(default)]
    pub insecure: bool,
}

/// Compact region representation returned by list endpoints.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegionStub {
    pub name: String,
    pub group: String,
    pub addresses: Vec<String>,
    pub tls_enabled: bool,
}

const DEFAULT_GROUP: &str = "default";

impl Region {
    /// Fill in optional fields the operator may omit.
    pub fn set_defaults(&mut self) {
        if self.group.is_empty() {
            self.group = DEFAULT_GROUP.into();
        }
    }

    pub fn validate(&self) -> Result<()> {
        super::validate_name(&self.name)
            .chain_err(|| ErrorKind::InvalidRegion(self.name.clone()))?;

        if self.api.is_empty() {
            bail!("region '{}': API list must have at least one entry", self.name);
        }

        let mut addrs = BTreeSet::new();
        let mut num_default = 0;

        for endpoint in &self.api {
            Url::parse(&endpoint.address)
                .chain_err(|| format!("region '{}': invalid API address '{}'", self.name, endpoint.address))?;
            if !addrs.insert(endpoint.address.clone()) {
                bail!("region '{}': duplicate API address '{}'", self.name, endpoint.address);
            }
            if endpoint.default {
                num_default += 1;
            }
        }

        if num_default > 1 {
            bail!("region '{}': API list can only have one default", self.name);
        }
        if self.group.is_empty() {
            bail!("region '{}': group cannot be empty", self.name);
        }

        Ok(())
    }

    /// The API endpoint marked default, or the first one. Validation
    /// guarantees the list is non-empty for stored regions.
    pub fn default_or_first_address(&self) -> &str {
        self.api
            .iter()
            .find(|a| a.default)
            .unwrap_or(&self.api[0])
            .address
            .as_str()
    }

    pub fn stub(&self) -> RegionStub {
        RegionStub {
            name: self.name.clone(),
            group: self.group.clone(),
            addresses: self.api.iter().map(|a| a.address.clone()).collect(),
            tls_enabled: self.tls.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_region() -> Region {
        Region {
            name: "euw1".into(),
            group: "eu".into(),
            auth: None,
            api: vec![RegionApi {
                address: "http://10.0.0.10:4646".into(),
                default: true,
            }],
            tls: None,
            metadata: None,
        }
    }

    #[test]
    fn region_validate_ok() {
        assert!(base_region().validate().is_ok());
    }

    #[test]
    fn region_validate_needs_api() {
        let mut r = base_region();
        r.api.clear();
        assert!(r.validate().is_err());
    }

    #[test]
    fn region_validate_duplicate_address() {
        let mut r = base_region();
        r.api.push(RegionApi {
            address: "http://10.0.0.10:4646".into(),
            default: false,
        });
        assert!(r.validate().is_err());
    }

    #[test]
    fn region_validate_single_default() {
        let mut r = base_region();
        r.api.push(RegionApi {
            address: "http://10.0.0.11:4646".into(),
            default: true,
        });
        assert!(r.validate().is_err());
    }

    #[test]
    fn region_default_group() {
        let mut r = base_region();
        r.group = "".into();
        r.set_defaults();
        assert_eq!(r.group, "default");
    }

    #[test]
    fn region_default_or_first() {
        let mut r = base_region();
        r.api = vec![
            RegionApi {
                address: "http://10.0.0.10:4646".into(),
                default: false,
            },
            RegionApi {
                address: "http://10.0.0.11:4646".into(),
                default: false,
            },
        ];
        assert_eq!(r.default_or_first_address(), "http://10.0.0.10:4646");

        r.api[1].default = true;
        assert_eq!(r.default_or_first_address(), "http://10.0.0.11:4646");
    }

    #[test]
    fn region_stub() {
        let stub = base_region().stub();
        assert_eq!(stub.name, "euw1");
        assert_eq!(stub.group, "eu");
        assert_eq!(stub.addresses, vec!["http://10.0.0.10:4646".to_string()]);
        assert!(!stub.tls_enabled);
    }
}
