// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The lifecycle operations the orchestrator calls.
//!
//! Each operation is gated on the backend selection and is a silent no-op
//! when the gate is closed, so an orchestrator that does not know which
//! messaging backend is active can call all of them unconditionally.

use crate::config::{ConfigError, SetupConfig};
use crate::converge::{ConvergeError, ConvergenceEngine};
use crate::ini::{IniError, IniFile};
use crate::rabbitmqctl::RabbitMqCtl;
use crate::service::ServiceManager;
use crate::transport;
use camino::Utf8Path;
use host_utils::{BoxedExecutor, ExecutionError};
use slog::{debug, info, o, Logger};
use slog_error_chain::SlogInlineError;

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ServiceControl(#[from] ExecutionError),
    #[error(transparent)]
    Converge(#[from] ConvergeError),
    #[error(transparent)]
    ConfigWrite(#[from] IniError),
}

pub struct RabbitSetup {
    config: SetupConfig,
    executor: BoxedExecutor,
    log: Logger,
}

impl RabbitSetup {
    pub fn new(
        config: SetupConfig,
        executor: BoxedExecutor,
        log: Logger,
    ) -> Self {
        Self { config, executor, log }
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    /// Removes the broker and purges its runtime packages.  Teardown is
    /// unconditional with respect to any earlier convergence state.
    pub async fn cleanup(&self) -> Result<(), SetupError> {
        if !self.config.selected() {
            debug!(self.log, "broker backend not selected; skipping cleanup");
            return Ok(());
        }
        let services = self.services();
        services.uninstall().await?;
        services.purge_runtime().await?;
        Ok(())
    }

    pub async fn install(&self) -> Result<(), SetupError> {
        if !self.config.selected() {
            debug!(self.log, "broker backend not selected; skipping install");
            return Ok(());
        }
        self.services().install().await?;
        Ok(())
    }

    /// Restarts the broker and converges its administrative credential;
    /// attempt exhaustion is fatal to the provisioning run.
    pub async fn restart_and_configure(&self) -> Result<(), SetupError> {
        if !self.config.selected() {
            debug!(
                self.log,
                "broker backend not selected; skipping configuration"
            );
            return Ok(());
        }
        let credential = self.config.credential()?;
        let services = self.services();
        let ctl = self.ctl();
        let engine = ConvergenceEngine::new(
            &services,
            &ctl,
            self.log.new(o!("component" => "ConvergenceEngine")),
        );
        engine.run(&credential, self.config.child_cell_enabled).await?;
        Ok(())
    }

    /// Writes the broker connection settings into `section` of `file`.
    ///
    /// Runs when the backend is selected, or when an explicit host+password
    /// override points consumers at an externally managed broker.
    pub fn export_config(
        &self,
        file: &Utf8Path,
        section: &str,
    ) -> Result<(), SetupError> {
        if !self.config.export_enabled() {
            debug!(
                self.log,
                "broker backend not selected; skipping config export"
            );
            return Ok(());
        }
        let assignments = transport::config_assignments(&self.config)?;
        let mut ini = IniFile::load(file)?;
        for assignment in &assignments {
            ini.set(section, assignment.key, &assignment.value);
        }
        ini.store()?;
        info!(
            self.log, "exported broker configuration";
            "file" => %file,
            "section" => section,
            "assignments" => assignments.len(),
        );
        Ok(())
    }

    fn services(&self) -> ServiceManager {
        ServiceManager::new(
            self.executor.clone(),
            &self.config,
            self.log.new(o!("component" => "ServiceManager")),
        )
    }

    fn ctl(&self) -> RabbitMqCtl {
        RabbitMqCtl::new(
            self.config.rabbitmqctl_path.clone(),
            self.executor.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use host_utils::{FakeExecutor, StaticHandler};
    use rabbit_test_utils::test_setup_log;

    fn setup(config: &str, log: &Logger) -> (RabbitSetup, std::sync::Arc<FakeExecutor>) {
        let executor = FakeExecutor::new(log.clone());
        let setup = RabbitSetup::new(
            toml::from_str(config).expect("valid config"),
            executor.clone().as_executor(),
            log.clone(),
        );
        (setup, executor)
    }

    #[tokio::test]
    async fn operations_are_noops_when_backend_not_selected() {
        let logctx =
            test_setup_log("operations_are_noops_when_backend_not_selected");
        let (setup, executor) = setup(
            r#"
            backend = "disabled"
            "#,
            &logctx.log,
        );

        // A StaticHandler with no expectations panics on any command.
        StaticHandler::new().register(&executor);

        setup.cleanup().await.expect("no-op");
        setup.install().await.expect("no-op");
        setup.restart_and_configure().await.expect("no-op");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn export_writes_nothing_when_gate_closed() {
        let logctx = test_setup_log("export_writes_nothing_when_gate_closed");
        let (setup, _executor) = setup(
            r#"
            backend = "disabled"
            "#,
            &logctx.log,
        );

        let dir = Utf8TempDir::new().expect("tempdir");
        let file = dir.path().join("consumer.conf");
        setup.export_config(&file, "oslo_messaging_rabbit").expect("no-op");
        assert!(!file.exists(), "gated export must not create the file");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn export_writes_assignments_for_selected_backend() {
        let logctx =
            test_setup_log("export_writes_assignments_for_selected_backend");
        let (setup, _executor) = setup(
            r#"
            backend = "rabbit"
            user_id = "admin"
            password = "secret"
            host = "10.0.0.5"
            heartbeat_rate = 2
            "#,
            &logctx.log,
        );

        let dir = Utf8TempDir::new().expect("tempdir");
        let file = dir.path().join("consumer.conf");
        setup
            .export_config(&file, "oslo_messaging_rabbit")
            .expect("exported");

        let contents = std::fs::read_to_string(&file).expect("read back");
        assert_eq!(
            contents,
            "[oslo_messaging_rabbit]\n\
             rpc_backend = rabbit\n\
             rabbit_hosts = 10.0.0.5:5672\n\
             rabbit_password = secret\n\
             rabbit_userid = admin\n\
             rabbit_heartbeat_rate = 2\n"
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn export_with_override_reaches_external_broker() {
        let logctx =
            test_setup_log("export_with_override_reaches_external_broker");
        let (setup, _executor) = setup(
            r#"
            backend = "disabled"
            user_id = "admin"
            password = "secret"
            host = "broker.example.com"
            "#,
            &logctx.log,
        );

        let dir = Utf8TempDir::new().expect("tempdir");
        let file = dir.path().join("consumer.conf");
        setup
            .export_config(&file, "oslo_messaging_rabbit")
            .expect("exported");
        let contents = std::fs::read_to_string(&file).expect("read back");
        assert!(
            contents.contains("rabbit_hosts = broker.example.com:5672"),
            "{contents}"
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn configure_requires_password() {
        let logctx = test_setup_log("configure_requires_password");
        let (setup, executor) = setup(
            r#"
            backend = "rabbit"
            "#,
            &logctx.log,
        );
        StaticHandler::new().register(&executor);

        let err = setup
            .restart_and_configure()
            .await
            .expect_err("password required");
        assert!(matches!(
            err,
            SetupError::Config(ConfigError::MissingPassword)
        ));

        logctx.cleanup_successful();
    }
}
