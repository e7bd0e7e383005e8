use anyhow::{anyhow, bail};
use std::path::PathBuf;

use crate::logging;

pub const ENV_LOG_LEVEL: &str = "SCHOOLD_LOG_LEVEL";
pub const ENV_WORKSPACE: &str = "SCHOOLD_WORKSPACE";

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub log_level: String,
    pub workspace: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: logging::default_log_level().to_string(),
            workspace: None,
        }
    }
}

impl DaemonConfig {
    /// Process arguments and environment, command line winning.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_sources(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    pub fn from_sources<I, F>(args: I, env: F) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(level) = env(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            cfg.log_level = level;
        }
        if let Some(ws) = env(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws));
        }

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--log-level" => {
                    cfg.log_level = args
                        .next()
                        .ok_or_else(|| anyhow!("--log-level requires a value"))?;
                }
                "--workspace" => {
                    let ws = args
                        .next()
                        .ok_or_else(|| anyhow!("--workspace requires a value"))?;
                    cfg.workspace = Some(PathBuf::from(ws));
                }
                other => bail!("unknown argument: {}", other),
            }
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_without_sources() {
        let cfg = DaemonConfig::from_sources(Vec::new(), |_| None).expect("config");
        assert_eq!(cfg, DaemonConfig::default());
        assert!(cfg.workspace.is_none());
    }

    #[test]
    fn command_line_overrides_environment() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_LOG_LEVEL, "warn"), (ENV_WORKSPACE, "/srv/env-ws")]);
        let cfg = DaemonConfig::from_sources(args(&["--workspace", "/srv/cli-ws"]), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .expect("config");
        assert_eq!(cfg.log_level, "warn");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/srv/cli-ws")));
    }

    #[test]
    fn blank_environment_values_are_ignored() {
        let cfg = DaemonConfig::from_sources(Vec::new(), |_| Some("  ".to_string()))
            .expect("config");
        assert_eq!(cfg, DaemonConfig::default());
    }

    #[test]
    fn rejects_unknown_flags_and_missing_values() {
        assert!(DaemonConfig::from_sources(args(&["--verbose"]), |_| None).is_err());
        assert!(DaemonConfig::from_sources(args(&["--log-level"]), |_| None).is_err());
    }
}
