use std::str::FromStr;

use log::Level;

use super::{Result, ResultExt};

/// The `log {}` config block.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub colour: Option<bool>,

    #[serde(default)]
    pub include_line: Option<bool>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            level: Some("info".into()),
            colour: Some(false),
            include_line: Some(false),
        }
    }
}

impl Config {
    pub fn level(&self) -> Result<Level> {
        let level = self.level.as_deref().unwrap_or("info");
        Level::from_str(level).chain_err(|| format!("failed to parse log level '{}'", level))
    }

    pub fn validate(&self) -> Result<()> {
        self.level()?;
        Ok(())
    }

    /// Merge another block over this one; set fields in `z` win.
    pub fn merge(&self, z: &Config) -> Config {
        Config {
            level: z.level.clone().or_else(|| self.level.clone()),
            colour: z.colour.or(self.colour),
            include_line: z.include_line.or(self.include_line),
        }
    }
}

/// Initialise process logging. Call once, before the server starts.
pub fn setup(cfg: &Config) -> Result<()> {
    loggerv::Logger::new()
        .max_level(cfg.level()?)
        .colors(cfg.colour.unwrap_or(false))
        .module_path(true)
        .line_numbers(cfg.include_line.unwrap_or(false))
        .init()
        .map_err(|e| format!("failed to setup logger: {}", e).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_parses() {
        assert_eq!(Config::default().level().unwrap(), Level::Info);
    }

    #[test]
    fn bad_level_rejected() {
        let cfg = Config {
            level: Some("shouty".into()),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn merge_later_wins() {
        let base = Config::default();
        let overlay = Config {
            level: Some("debug".into()),
            colour: None,
            include_line: Some(true),
        };

        let merged = base.merge(&overlay);
        assert_eq!(merged.level().unwrap(), Level::Debug);
        assert_eq!(merged.colour, Some(false));
        assert_eq!(merged.include_line, Some(true));
    }
}
