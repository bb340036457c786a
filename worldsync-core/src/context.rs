//! Launcher instance context.
//!
//! A pass always runs against exactly one instance. The launcher exports the
//! instance description through environment variables before it runs
//! pre-launch and post-exit commands:
//!
//! ```text
//! INST_ID      instance identifier (stable, used in remote records)
//! INST_NAME    human-readable instance name
//! INST_DIR     instance directory (holds instance.cfg)
//! INST_MC_DIR  game directory (holds saves/)
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::{HostName, InstanceId};

pub const ENV_INSTANCE_ID: &str = "INST_ID";
pub const ENV_INSTANCE_NAME: &str = "INST_NAME";
pub const ENV_INSTANCE_DIR: &str = "INST_DIR";
pub const ENV_GAME_DIR: &str = "INST_MC_DIR";

/// Everything a pass needs to know about where it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceContext {
    pub instance: InstanceId,
    pub name: String,
    pub instance_dir: PathBuf,
    pub game_dir: PathBuf,
    pub saves_dir: PathBuf,
    pub host: HostName,
}

impl InstanceContext {
    /// Resolve the context from the process environment.
    pub fn from_env(host: HostName) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), host)
    }

    /// Resolve the context through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, host: HostName) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar { var })
        };

        let instance = InstanceId::from(required(ENV_INSTANCE_ID)?);
        let name = required(ENV_INSTANCE_NAME)?;
        let instance_dir = PathBuf::from(required(ENV_INSTANCE_DIR)?);
        let game_dir = PathBuf::from(required(ENV_GAME_DIR)?);
        let saves_dir = game_dir.join("saves");

        Ok(Self {
            instance,
            name,
            instance_dir,
            game_dir,
            saves_dir,
            host,
        })
    }

    /// Fail with [`ConfigError::SavesDirMissing`] unless the saves root is a
    /// directory.
    pub fn require_saves_dir(&self) -> Result<&Path, ConfigError> {
        if self.saves_dir.is_dir() {
            Ok(&self.saves_dir)
        } else {
            Err(ConfigError::SavesDirMissing {
                path: self.saves_dir.clone(),
            })
        }
    }

    /// `<instance_dir>/instance.cfg`
    pub fn instance_cfg_path(&self) -> PathBuf {
        self.instance_dir.join("instance.cfg")
    }

    /// Parse `instance.cfg`. A missing file yields an empty map.
    pub fn instance_cfg(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let path = self.instance_cfg_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(parse_instance_cfg(&raw))
    }

    /// The `name` entry of `instance.cfg`, falling back to `INST_NAME`.
    pub fn display_name(&self) -> String {
        self.instance_cfg()
            .ok()
            .and_then(|cfg| cfg.get("name").cloned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// `key=value` per line; the value keeps any further `=` characters.
pub fn parse_instance_cfg(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() || key.starts_with('[') {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(game_dir: &Path) -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_INSTANCE_ID, "1.19.2".to_string()),
            (ENV_INSTANCE_NAME, "Vanilla".to_string()),
            (ENV_INSTANCE_DIR, "/instances/1.19.2".to_string()),
            (ENV_GAME_DIR, game_dir.display().to_string()),
        ])
    }

    #[test]
    fn resolves_saves_dir_under_game_dir() {
        let ctx = InstanceContext::from_lookup(
            |k| vars(Path::new("/games/mc")).get(k).cloned(),
            HostName::from("desk"),
        )
        .unwrap();
        assert_eq!(ctx.instance, InstanceId::from("1.19.2"));
        assert_eq!(ctx.saves_dir, PathBuf::from("/games/mc/saves"));
        assert_eq!(ctx.host, HostName::from("desk"));
    }

    #[test]
    fn missing_var_names_the_variable() {
        let mut env = vars(Path::new("/games/mc"));
        env.remove(ENV_INSTANCE_ID);
        let err =
            InstanceContext::from_lookup(|k| env.get(k).cloned(), HostName::from("h")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { var: "INST_ID" }));
        assert!(err.to_string().contains("INST_ID"));
    }

    #[test]
    fn blank_var_counts_as_missing() {
        let mut env = vars(Path::new("/games/mc"));
        env.insert(ENV_GAME_DIR, "   ".to_string());
        let err =
            InstanceContext::from_lookup(|k| env.get(k).cloned(), HostName::from("h")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { var: "INST_MC_DIR" }));
    }

    #[test]
    fn require_saves_dir_checks_existence() {
        let tmp = TempDir::new().unwrap();
        let env = vars(tmp.path());
        let ctx = InstanceContext::from_lookup(|k| env.get(k).cloned(), HostName::from("h")).unwrap();
        assert!(matches!(
            ctx.require_saves_dir(),
            Err(ConfigError::SavesDirMissing { .. })
        ));

        std::fs::create_dir_all(tmp.path().join("saves")).unwrap();
        assert_eq!(ctx.require_saves_dir().unwrap(), tmp.path().join("saves"));
    }

    #[test]
    fn instance_cfg_parses_key_values() {
        let cfg = parse_instance_cfg("[General]\nname=My Pack\nJvmArgs=-Da=b\r\nbroken line\n");
        assert_eq!(cfg.get("name").map(String::as_str), Some("My Pack"));
        assert_eq!(cfg.get("JvmArgs").map(String::as_str), Some("-Da=b"));
        assert_eq!(cfg.len(), 2);
    }

    #[test]
    fn display_name_prefers_instance_cfg() {
        let tmp = TempDir::new().unwrap();
        let mut env = vars(tmp.path());
        env.insert(ENV_INSTANCE_DIR, tmp.path().display().to_string());
        let ctx = InstanceContext::from_lookup(|k| env.get(k).cloned(), HostName::from("h")).unwrap();
        assert_eq!(ctx.display_name(), "Vanilla");

        std::fs::write(tmp.path().join("instance.cfg"), "name=Skyblock\n").unwrap();
        assert_eq!(ctx.display_name(), "Skyblock");
    }
}
