//! Flat `key = value` settings from a `vergerc` file.
//!
//! Lines starting with `#` are comments, trailing `# ...` is stripped, and
//! `include <path>` pulls in another file relative to the including one.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use tracing::{debug, info, instrument, trace, warn};

const RC_ENV_VAR: &str = "VERGERC";

const DEFAULTS: [(&str, &str); 4] = [
    ("data.location", "~/.verge"),
    ("default.command", "list"),
    ("color", "on"),
    ("watch.interval", "60"),
];

#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Config {
    /// Defaults overlaid with the rc file from `--config`, `$VERGERC`
    /// (`/dev/null` disables it) or `~/.vergerc`, in that order.
    #[instrument]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Self {
            map: DEFAULTS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            loaded_files: Vec::new(),
        };

        match rc_path(rc_override) {
            Some(path) => {
                info!(rc = %path.display(), "loading vergerc");
                cfg.load_file(&path)?;
            }
            None => debug!("no vergerc; using defaults"),
        }
        Ok(cfg)
    }

    /// Applies `key=value` pairs from the command line; an `rc.` prefix is
    /// dropped.
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in overrides {
            let key = key.strip_prefix("rc.").unwrap_or(&key).to_string();
            debug!(%key, %value, "config override");
            self.map.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    /// On/off setting; anything other than the usual spellings is an error.
    pub fn get_switch(&self, key: &str) -> anyhow::Result<Option<bool>> {
        let Some(raw) = self.map.get(key) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "on" | "yes" | "y" | "true" | "1" => Ok(Some(true)),
            "off" | "no" | "n" | "false" | "0" => Ok(Some(false)),
            other => bail!("config key {key} expects on or off, got {other}"),
        }
    }

    pub fn get_u64(&self, key: &str) -> anyhow::Result<Option<u64>> {
        self.map
            .get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("config key {key} expects a whole number, got {raw}"))
            })
            .transpose()
    }

    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.loaded_files.push(path.clone());
        let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.split_once('#').map_or(raw_line, |(before, _)| before).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(include) = line.strip_prefix("include ") {
                let include = include.trim();
                if include.is_empty() {
                    bail!("{}:{}: include needs a path", path.display(), idx + 1);
                }
                let target = base_dir.join(expand_tilde(Path::new(include)));
                if target.exists() {
                    self.load_file(&target)?;
                } else {
                    warn!(include = %target.display(), "include file missing; skipping");
                }
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                anyhow!("invalid config line {}:{}: {raw_line}", path.display(), idx + 1)
            })?;
            trace!(key = key.trim(), value = value.trim(), "config key");
            self.map.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(())
    }
}

/// `--data`, else `data.location`, else `~/.verge`; created when missing.
#[instrument(skip(cfg))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match (override_dir, cfg.get("data.location")) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(location)) => expand_tilde(Path::new(&location)),
        (None, None) => dirs::home_dir()
            .ok_or_else(|| anyhow!("cannot determine home directory"))?
            .join(".verge"),
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(dir)
}

fn rc_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(RC_ENV_VAR) {
        return (env_path != "/dev/null").then(|| PathBuf::from(env_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".vergerc"))
        .filter(|candidate| candidate.exists())
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn loads_file_with_include_and_overrides() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("extra.rc"), "color = off\n").expect("write include");
        let rc = temp.path().join("vergerc");
        fs::write(
            &rc,
            "# comment\ndata.location = /tmp/verge # trailing\ninclude extra.rc\n",
        )
        .expect("write rc");

        let mut cfg = Config::load(Some(rc.as_path())).expect("load config");
        assert_eq!(cfg.get("data.location").as_deref(), Some("/tmp/verge"));
        assert_eq!(cfg.get_switch("color").expect("switch"), Some(false));
        assert_eq!(cfg.get_u64("watch.interval").expect("number"), Some(60));
        assert_eq!(cfg.loaded_files.len(), 2);

        cfg.apply_overrides([("rc.watch.interval".to_string(), "5".to_string())]);
        assert_eq!(cfg.get_u64("watch.interval").expect("number"), Some(5));
    }

    #[test]
    fn rejects_malformed_values() {
        let temp = tempdir().expect("tempdir");
        let rc = temp.path().join("vergerc");
        fs::write(&rc, "just words\n").expect("write rc");
        assert!(Config::load(Some(rc.as_path())).is_err());

        fs::write(&rc, "color = purple\nwatch.interval = soon\n").expect("write rc");
        let cfg = Config::load(Some(rc.as_path())).expect("load config");
        assert!(cfg.get_switch("color").is_err());
        assert!(cfg.get_u64("watch.interval").is_err());
    }

    #[test]
    fn data_dir_override_wins() {
        let temp = tempdir().expect("tempdir");
        let rc = temp.path().join("vergerc");
        fs::write(&rc, "data.location = /nonexistent/verge\n").expect("write rc");
        let cfg = Config::load(Some(rc.as_path())).expect("load config");

        let target = temp.path().join("data");
        let dir = resolve_data_dir(&cfg, Some(target.as_path())).expect("resolve");
        assert_eq!(dir, target);
        assert!(target.is_dir());
    }
}
