// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wrappers around the platform's package and service tooling.

use crate::config::SetupConfig;
use host_utils::{BoxedExecutor, ExecutionError, APT_GET, PKILL, SYSTEMCTL};
use slog::{info, Logger};
use tokio::process::Command;

// The Erlang port mapper keeps running after the broker package is removed
// and holds its listen port; it is terminated best-effort on uninstall.
const EPMD: &str = "epmd";

pub struct ServiceManager {
    executor: BoxedExecutor,
    service: String,
    package: String,
    runtime_packages: Vec<String>,
    log: Logger,
}

impl ServiceManager {
    pub fn new(
        executor: BoxedExecutor,
        config: &SetupConfig,
        log: Logger,
    ) -> Self {
        Self {
            executor,
            service: config.service.clone(),
            package: config.package.clone(),
            runtime_packages: config.runtime_packages.clone(),
            log,
        }
    }

    pub async fn install(&self) -> Result<(), ExecutionError> {
        info!(self.log, "installing broker package"; "package" => &self.package);
        let mut cmd = Command::new(APT_GET);
        cmd.env("DEBIAN_FRONTEND", "noninteractive");
        cmd.args(["install", "-q", "-y"]).arg(&self.package);
        self.executor.execute_async(&mut cmd).await?;
        Ok(())
    }

    /// Purges the broker package, then terminates its port-mapper helper.
    pub async fn uninstall(&self) -> Result<(), ExecutionError> {
        info!(self.log, "removing broker package"; "package" => &self.package);
        let mut cmd = Command::new(APT_GET);
        cmd.env("DEBIAN_FRONTEND", "noninteractive");
        cmd.args(["purge", "-q", "-y"]).arg(&self.package);
        self.executor.execute_async(&mut cmd).await?;
        self.stop_epmd().await
    }

    /// Purges the broker's runtime dependency packages.
    pub async fn purge_runtime(&self) -> Result<(), ExecutionError> {
        info!(
            self.log, "purging broker runtime packages";
            "packages" => ?self.runtime_packages,
        );
        let mut cmd = Command::new(APT_GET);
        cmd.env("DEBIAN_FRONTEND", "noninteractive");
        cmd.args(["purge", "-q", "-y"]);
        for package in &self.runtime_packages {
            cmd.arg(package);
        }
        self.executor.execute_async(&mut cmd).await?;
        Ok(())
    }

    pub async fn restart(&self) -> Result<(), ExecutionError> {
        info!(self.log, "restarting broker service"; "service" => &self.service);
        let mut cmd = Command::new(SYSTEMCTL);
        cmd.arg("restart").arg(&self.service);
        self.executor.execute_async(&mut cmd).await?;
        Ok(())
    }

    async fn stop_epmd(&self) -> Result<(), ExecutionError> {
        let mut cmd = Command::new(PKILL);
        cmd.args(["-x", EPMD]);
        match self.executor.execute_async(&mut cmd).await {
            Ok(_) => Ok(()),
            // pkill exits 1 when nothing matched; the helper may already be
            // gone.
            Err(ExecutionError::CommandFailure(info))
                if info.status.code() == Some(1) =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
