use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::Level;
use url::Url;

use super::{logger, ErrorKind, Result, ResultExt};

/// Top level server configuration.
///
/// Multiple documents merge in load order over the built-in defaults; later
/// values override earlier ones. Files are YAML (JSON parses through the
/// same reader).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub log: Option<logger::Config>,

    #[serde(default)]
    pub state: Option<attila_state::Config>,

    #[serde(default)]
    pub http: Option<HttpConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HttpConfig {
    #[serde(default, rename = "bind")]
    pub binds: Option<Vec<BindConfig>>,

    #[serde(default)]
    pub access_log_level: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindConfig {
    pub addr: String,
}

impl Default for HttpConfig {
    fn default() -> HttpConfig {
        HttpConfig {
            binds: Some(vec![BindConfig {
                addr: "http://127.0.0.1:8080".into(),
            }]),
            access_log_level: Some("info".into()),
        }
    }
}

impl HttpConfig {
    pub fn access_log_level(&self) -> Result<Level> {
        let level = self.access_log_level.as_deref().unwrap_or("info");
        Level::from_str(level)
            .chain_err(|| format!("failed to parse access log level '{}'", level))
    }

    pub fn bind_list(&self) -> Vec<BindConfig> {
        self.binds.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        let binds = self.bind_list();
        if binds.is_empty() {
            bail!("http bind address required");
        }

        self.access_log_level()?;

        for bind in &binds {
            let parsed = Url::parse(&bind.addr)
                .chain_err(|| format!("failed to parse bind address '{}'", bind.addr))?;
            match parsed.scheme() {
                "unix" | "http" | "https" => {}
                scheme => bail!(ErrorKind::UnsupportedBindScheme(scheme.to_string())),
            }
        }

        Ok(())
    }

    /// Merge another block over this one. Bind addresses union as a set so
    /// repeated documents cannot double-register a listener.
    pub fn merge(&self, z: &HttpConfig) -> HttpConfig {
        let mut bind_set: BTreeSet<BindConfig> = BTreeSet::new();
        bind_set.extend(self.bind_list());
        bind_set.extend(z.bind_list());

        HttpConfig {
            binds: Some(bind_set.into_iter().collect()),
            access_log_level: z
                .access_log_level
                .clone()
                .or_else(|| self.access_log_level.clone()),
        }
    }
}

impl Config {
    /// The built-in configuration: info logging, memory state, one local
    /// HTTP bind. Suitable for use without modification.
    pub fn default_config() -> Config {
        Config {
            log: Some(logger::Config::default()),
            state: Some(attila_state::Config::default()),
            http: Some(HttpConfig::default()),
        }
    }

    pub fn log(&self) -> logger::Config {
        self.log.clone().unwrap_or_default()
    }

    pub fn state(&self) -> attila_state::Config {
        self.state.clone().unwrap_or_default()
    }

    pub fn http(&self) -> HttpConfig {
        self.http.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        match &self.log {
            Some(log) => log.validate()?,
            None => bail!("log config block required"),
        }
        match &self.state {
            Some(state) => state.validate()?,
            None => bail!("state config block required"),
        }
        match &self.http {
            Some(http) => http.validate()?,
            None => bail!("http config block required"),
        }
        Ok(())
    }

    pub fn merge(&self, z: &Config) -> Config {
        Config {
            log: merge_blocks(&self.log, &z.log, |a, b| a.merge(b)),
            state: merge_blocks(&self.state, &z.state, |a, b| a.merge(b)),
            http: merge_blocks(&self.http, &z.http, |a, b| a.merge(b)),
        }
    }
}

fn merge_blocks<T: Clone>(
    base: &Option<T>,
    overlay: &Option<T>,
    merge: impl Fn(&T, &T) -> T,
) -> Option<T> {
    match (base, overlay) {
        (Some(a), Some(b)) => Some(merge(a, b)),
        (Some(a), None) => Some(a.clone()),
        (None, b) => b.clone(),
    }
}

/// Load the server configuration: defaults, then each document in order.
pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Config> {
    let mut cfg = Config::default_config();

    for path in paths {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .chain_err(|| format!("failed to read config file '{}'", path.display()))?;
        let file_cfg: Config = serde_yaml::from_str(&raw)
            .chain_err(|| format!("failed to parse config file '{}'", path.display()))?;
        cfg = cfg.merge(&file_cfg);
        debug!("merged config file {}", path.display());
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default_config().validate().is_ok());
    }

    #[test]
    fn missing_blocks_rejected() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn bind_scheme_validation() {
        let mut http = HttpConfig::default();
        http.binds = Some(vec![BindConfig {
            addr: "ftp://127.0.0.1:21".into(),
        }]);
        assert!(http.validate().is_err());

        http.binds = Some(vec![
            BindConfig {
                addr: "http://0.0.0.0:8080".into(),
            },
            BindConfig {
                addr: "unix:///run/attila.sock".into(),
            },
        ]);
        assert!(http.validate().is_ok());
    }

    #[test]
    fn empty_binds_rejected() {
        let http = HttpConfig {
            binds: Some(vec![]),
            access_log_level: Some("info".into()),
        };
        assert!(http.validate().is_err());
    }

    #[test]
    fn bind_addresses_deduplicate() {
        let a = HttpConfig {
            binds: Some(vec![
                BindConfig {
                    addr: "http://127.0.0.1:8080".into(),
                },
                BindConfig {
                    addr: "http://127.0.0.1:9090".into(),
                },
            ]),
            access_log_level: None,
        };
        let b = HttpConfig {
            binds: Some(vec![BindConfig {
                addr: "http://127.0.0.1:8080".into(),
            }]),
            access_log_level: Some("debug".into()),
        };

        let merged = a.merge(&b);
        assert_eq!(merged.bind_list().len(), 2);
        assert_eq!(merged.access_log_level().unwrap(), Level::Debug);
    }

    #[test]
    fn yaml_document_merges_over_defaults() {
        let doc = r#"
log:
  level: debug
state:
  memory:
    enabled: false
  file:
    enabled: true
    path: /var/lib/attila
http:
  bind:
    - addr: http://0.0.0.0:4655
  access_log_level: debug
"#;
        let file_cfg: Config = serde_yaml::from_str(doc).unwrap();
        let cfg = Config::default_config().merge(&file_cfg);

        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.state().validate().is_ok(), true);
        assert_eq!(cfg.log().level.as_deref(), Some("debug"));

        // default bind remains alongside the configured one (set union)
        let binds = cfg.http().bind_list();
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn json_document_parses_too() {
        let doc = r#"{"http": {"access_log_level": "trace"}}"#;
        let file_cfg: Config = serde_yaml::from_str(doc).unwrap();
        let cfg = Config::default_config().merge(&file_cfg);
        assert_eq!(cfg.http().access_log_level().unwrap(), Level::Trace);
    }
}
