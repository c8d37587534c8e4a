//! File configuration for `weaverd`, overridable from the command line.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use weaver_spec::CallerId;

/// On-disk configuration (JSON).
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WeaverConfig {
    /// Journal file holding the slot image.
    pub state_path: Option<PathBuf>,
    /// Hex identity allowed to obtain the store handle.
    pub authorized_caller: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub state_path: PathBuf,
    pub authorized: CallerId,
}

impl WeaverConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("parse config {}", path.display()))
    }

    /// Apply command-line overrides and validate.
    pub fn resolve(
        self,
        state_path: Option<PathBuf>,
        authorized_caller: Option<String>,
    ) -> anyhow::Result<Settings> {
        let state_path = state_path
            .or(self.state_path)
            .ok_or_else(|| anyhow!("no state path: set --state or state_path in the config"))?;
        let authorized = authorized_caller
            .or(self.authorized_caller)
            .ok_or_else(|| {
                anyhow!("no authorized caller: set --authorized-caller or authorized_caller")
            })?;
        let authorized = CallerId::from_hex(&authorized)
            .map_err(|e| anyhow!("authorized caller: {e}"))?;
        Ok(Settings {
            state_path,
            authorized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file() {
        let config = WeaverConfig {
            state_path: Some("/var/lib/weaver/slots.img".into()),
            authorized_caller: Some("a000000062".into()),
        };
        let settings = config
            .resolve(Some("/tmp/override.img".into()), None)
            .unwrap();
        assert_eq!(settings.state_path, PathBuf::from("/tmp/override.img"));
        assert_eq!(settings.authorized.as_bytes(), &[0xa0, 0, 0, 0, 0x62]);
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = WeaverConfig::default().resolve(None, None).unwrap_err();
        assert!(err.to_string().contains("state path"));

        let err = WeaverConfig::default()
            .resolve(Some("x".into()), Some("zz".into()))
            .unwrap_err();
        assert!(err.to_string().contains("authorized caller"));
    }

    #[test]
    fn parses_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weaver.json");
        std::fs::write(
            &path,
            r#"{"state_path":"slots.img","authorized_caller":"0102"}"#,
        )
        .unwrap();
        let config = WeaverConfig::load(&path).unwrap();
        assert_eq!(config.state_path, Some(PathBuf::from("slots.img")));

        std::fs::write(&path, r#"{"unknown":1}"#).unwrap();
        assert!(WeaverConfig::load(&path).is_err());
    }
}
