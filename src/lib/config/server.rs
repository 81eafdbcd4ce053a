//! Capability server (owner) configuration.
//!
//! ```toml
//! [[servers]]
//! id = "inventory"
//! endpoint = "http://127.0.0.1:9001/mcp"
//!
//! [[servers]]
//! id = "files"
//! command = "${HOME}/bin/files-mcp"
//! args = ["--root", "/srv"]
//! enabled = false
//! ```

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum OwnerEndpoint {
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
    Stdio {
        command: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        workdir: Option<PathBuf>,
    },
}

impl fmt::Display for OwnerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerEndpoint::Http { url, .. } => write!(f, "{url}"),
            OwnerEndpoint::Stdio { command, args, .. } => {
                write!(f, "stdio:{}", command.display())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawServer")]
pub struct OwnerConfig {
    pub id: String,
    pub endpoint: OwnerEndpoint,
    pub enabled: bool,
}

impl OwnerConfig {
    pub fn http(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: OwnerEndpoint::Http {
                url: url.into(),
                headers: HashMap::new(),
            },
            enabled: true,
        }
    }

    /// Builds a config from loose parts using the same rules as the file loader.
    pub fn from_parts(
        id: impl Into<String>,
        endpoint: Option<String>,
        command: Option<String>,
        args: Vec<String>,
        headers: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        Self::try_from(RawServer {
            id: id.into(),
            endpoint,
            headers,
            command,
            args,
            env: HashMap::new(),
            workdir: None,
            enabled: true,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    #[serde(alias = "name")]
    id: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl TryFrom<RawServer> for OwnerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServer) -> Result<Self, Self::Error> {
        let endpoint = match (raw.endpoint, raw.command) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::AmbiguousServerEndpoint { server: raw.id });
            }
            (None, None) => return Err(ConfigError::MissingServerEndpoint { server: raw.id }),
            (Some(url), None) => OwnerEndpoint::Http {
                url: expand(&url),
                headers: raw
                    .headers
                    .into_iter()
                    .map(|(key, value)| (key, expand(&value)))
                    .collect(),
            },
            (None, Some(command)) => OwnerEndpoint::Stdio {
                command: PathBuf::from(expand(&command)),
                args: raw.args.iter().map(|arg| expand(arg)).collect(),
                env: raw.env,
                workdir: raw.workdir.map(|dir| PathBuf::from(expand(&dir))),
            },
        };

        Ok(Self {
            id: raw.id,
            endpoint,
            enabled: raw.enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn raw(endpoint: Option<&str>, command: Option<&str>) -> RawServer {
        RawServer {
            id: "test-server".to_string(),
            endpoint: endpoint.map(String::from),
            headers: HashMap::new(),
            command: command.map(String::from),
            args: vec!["--flag".to_string(), "${TOOLRELAY_TEST_ARG}".to_string()],
            env: HashMap::new(),
            workdir: Some("${TOOLRELAY_TEST_ROOT}/work".to_string()),
            enabled: true,
        }
    }

    #[test]
    fn expands_env_vars_in_command_and_args() {
        unsafe {
            env::set_var("TOOLRELAY_TEST_ROOT", "/path/to/mcp");
            env::set_var("TOOLRELAY_TEST_ARG", "example-arg");
        }

        let config =
            OwnerConfig::try_from(raw(None, Some("${TOOLRELAY_TEST_ROOT}/server"))).expect("valid");

        let OwnerEndpoint::Stdio {
            command,
            args,
            workdir,
            ..
        } = config.endpoint
        else {
            panic!("expected stdio endpoint");
        };
        let cmd = command.to_str().expect("valid utf8");
        assert!(cmd.contains("/path/to/mcp/server") || cmd.contains("\\path\\to\\mcp\\server"));
        assert!(args.contains(&"example-arg".to_string()));
        let workdir = workdir.expect("workdir exists");
        assert!(workdir.to_string_lossy().contains("mcp"));

        unsafe {
            env::remove_var("TOOLRELAY_TEST_ROOT");
            env::remove_var("TOOLRELAY_TEST_ARG");
        }
    }

    #[test]
    fn http_endpoint_is_kept_verbatim() {
        let config = OwnerConfig::try_from(raw(Some("http://127.0.0.1:9001/mcp"), None)).expect("valid");
        assert_eq!(config.endpoint.to_string(), "http://127.0.0.1:9001/mcp");
        assert!(config.enabled);
    }

    #[test]
    fn rejects_missing_or_ambiguous_endpoint() {
        assert!(matches!(
            OwnerConfig::try_from(raw(None, None)),
            Err(ConfigError::MissingServerEndpoint { .. })
        ));
        assert!(matches!(
            OwnerConfig::try_from(raw(Some("http://x"), Some("cmd"))),
            Err(ConfigError::AmbiguousServerEndpoint { .. })
        ));
    }
}
