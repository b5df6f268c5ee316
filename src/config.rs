use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::variables::VariableStore;

/// Looked up next to the script when `--config` is not given.
pub const CONFIG_FILE: &str = "facit.toml";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Seeds the variable store before the script is parsed.
    pub variables: HashMap<String, String>,
    pub http: Http,
    pub facit: FacitSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Http {
    pub timeout_secs: u64,
}

impl Default for Http {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FacitSettings {
    pub extension: String,
    /// Response headers never recorded or compared, matched case-insensitively.
    pub skip_headers: Vec<String>,
}

impl Default for FacitSettings {
    fn default() -> Self {
        Self {
            extension: "facit".into(),
            skip_headers: vec!["date".into()],
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_owned(),
            source,
        })
    }

    /// An explicit path must exist. Without one, `facit.toml` next to the
    /// script is used when present, otherwise the defaults.
    pub fn discover(explicit: Option<&Path>, script: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let candidate = script
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(CONFIG_FILE);

        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// `<script>.<extension>`, e.g. `api.http.facit`.
    pub fn facit_path(&self, script: &Path) -> PathBuf {
        let mut path = script.as_os_str().to_owned();
        path.push(".");
        path.push(&self.facit.extension);
        PathBuf::from(path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn seed(&self, store: &mut VariableStore) {
        for (key, value) in &self.variables {
            store.insert(key.as_str(), value.as_str());
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::config::Config;
    use crate::config::ConfigError;
    use crate::variables::Value;
    use crate::variables::VariableStore;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert!(config.variables.is_empty());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.facit.extension, "facit");
        assert_eq!(config.facit.skip_headers, vec!["date".to_string()]);
    }

    #[test]
    fn parses_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [variables]
            baseUrl = "http://localhost:8080"

            [http]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.facit.extension, "facit");

        let mut store = VariableStore::new();
        config.seed(&mut store);
        assert_eq!(
            store.get("baseUrl"),
            Some(&Value::from("http://localhost:8080"))
        );
    }

    #[test]
    fn facit_path_appends_extension() {
        let mut config = Config::default();
        assert_eq!(
            config.facit_path(Path::new("tests/api.http")),
            Path::new("tests/api.http.facit")
        );

        config.facit.extension = "golden".into();
        assert_eq!(
            config.facit_path(Path::new("api.http")),
            Path::new("api.http.golden")
        );
    }

    #[test]
    fn discovers_config_next_to_script() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("api.http");

        assert_eq!(Config::discover(None, &script).unwrap(), Config::default());

        std::fs::write(
            dir.path().join("facit.toml"),
            "[facit]\nskip_headers = [\"date\", \"x-request-id\"]\n",
        )
        .unwrap();
        let config = Config::discover(None, &script).unwrap();
        assert_eq!(config.facit.skip_headers, vec!["date", "x-request-id"]);
    }

    #[test]
    fn reports_bad_config() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("api.http");

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::discover(Some(&missing), &script),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[http]\ntimeout_secs = \"soon\"\n").unwrap();
        assert!(matches!(
            Config::discover(Some(&bad), &script),
            Err(ConfigError::Toml { .. })
        ));
    }
}
