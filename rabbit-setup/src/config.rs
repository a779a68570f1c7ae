// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for working with broker setup configuration

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use slog_error_chain::SlogInlineError;

/// Default AMQP listener port.
pub const AMQP_PORT: u16 = 5672;

/// Which messaging backend the orchestrator selected for this deployment.
///
/// Resolved by the orchestrator, read-only here; every lifecycle operation is
/// a no-op when the broker is not the selected backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    Rabbit,
    Disabled,
}

/// The single administrative identity provisioned on the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerCredential {
    pub user_id: String,
    pub password: String,
}

/// Resolved parameters for one provisioning run
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SetupConfig {
    pub backend: BackendSelection,
    /// Administrative user asserted on the broker
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Target password for the administrative user
    pub password: Option<String>,
    /// Explicit broker host override; also gates config export together with
    /// an explicit password when the backend is not selected
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Broker-side liveness tuning, written to consumer configs only when set
    pub heartbeat_timeout_threshold: Option<u64>,
    /// Broker-side keepalive interval, written to consumer configs only when
    /// set
    pub heartbeat_rate: Option<u64>,
    /// Whether to provision the secondary vhost for a child deployment cell
    #[serde(default)]
    pub child_cell_enabled: bool,
    /// Path to the broker's administrative CLI
    #[serde(default = "default_rabbitmqctl_path")]
    pub rabbitmqctl_path: Utf8PathBuf,
    /// Service unit restarted while converging
    #[serde(default = "default_service")]
    pub service: String,
    /// OS package delivering the broker
    #[serde(default = "default_package")]
    pub package: String,
    /// Runtime dependency packages purged on cleanup
    #[serde(default = "default_runtime_packages")]
    pub runtime_packages: Vec<String>,
}

fn default_user_id() -> String {
    "stackrabbit".to_string()
}

fn default_port() -> u16 {
    AMQP_PORT
}

fn default_rabbitmqctl_path() -> Utf8PathBuf {
    "rabbitmqctl".into()
}

fn default_service() -> String {
    "rabbitmq-server".to_string()
}

fn default_package() -> String {
    "rabbitmq-server".to_string()
}

fn default_runtime_packages() -> Vec<String> {
    // apt treats an argument containing `*` as a pattern; this sweeps the
    // Erlang runtime the broker package pulled in.
    vec!["erlang*".to_string()]
}

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("no broker password configured")]
    MissingPassword,
}

impl SetupConfig {
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::Io { path: path.to_owned(), err }
        })?;
        toml::from_str(&contents)
            .map_err(|err| ConfigError::Parse { path: path.to_owned(), err })
    }

    /// Whether this broker is the selected RPC backend.
    pub fn selected(&self) -> bool {
        matches!(self.backend, BackendSelection::Rabbit)
    }

    /// Whether connection settings may be exported to consumer configs:
    /// either the backend is selected, or both a host and a password were
    /// explicitly supplied.
    pub fn export_enabled(&self) -> bool {
        self.selected() || (self.host.is_some() && self.password.is_some())
    }

    pub fn resolved_host(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// The provisioning target credential; requires a configured password.
    pub fn credential(&self) -> Result<BrokerCredential, ConfigError> {
        let password =
            self.password.clone().ok_or(ConfigError::MissingPassword)?;
        Ok(BrokerCredential { user_id: self.user_id.clone(), password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: SetupConfig = toml::from_str(
            r#"
            backend = "rabbit"
            password = "secret"
            "#,
        )
        .expect("parsed");

        assert_eq!(config.backend, BackendSelection::Rabbit);
        assert_eq!(config.user_id, "stackrabbit");
        assert_eq!(config.port, AMQP_PORT);
        assert_eq!(config.resolved_host(), "localhost");
        assert_eq!(config.service, "rabbitmq-server");
        assert_eq!(config.package, "rabbitmq-server");
        assert_eq!(config.runtime_packages, vec!["erlang*".to_string()]);
        assert!(!config.child_cell_enabled);
        assert!(config.selected());
        assert!(config.export_enabled());
    }

    #[test]
    fn unselected_without_override_disables_export() {
        let config: SetupConfig = toml::from_str(
            r#"
            backend = "disabled"
            "#,
        )
        .expect("parsed");
        assert!(!config.selected());
        assert!(!config.export_enabled());
    }

    #[test]
    fn explicit_override_enables_export_when_unselected() {
        let config: SetupConfig = toml::from_str(
            r#"
            backend = "disabled"
            host = "10.0.0.5"
            password = "secret"
            "#,
        )
        .expect("parsed");
        assert!(!config.selected());
        assert!(config.export_enabled());
        assert_eq!(config.resolved_host(), "10.0.0.5");
    }

    #[test]
    fn credential_requires_password() {
        let config: SetupConfig = toml::from_str(
            r#"
            backend = "rabbit"
            "#,
        )
        .expect("parsed");
        let err = config.credential().expect_err("no password");
        assert!(matches!(err, ConfigError::MissingPassword));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<SetupConfig>(
            r#"
            backend = "rabbit"
            password = "secret"
            qpid_host = "never"
            "#,
        )
        .expect_err("unknown field");
        assert!(err.to_string().contains("qpid_host"), "{err}");
    }
}
