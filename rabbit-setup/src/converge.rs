// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The credential convergence state machine.
//!
//! The broker is known to intermittently come up with its administrative
//! interface not yet answering, and a restart is sometimes needed to shake
//! it loose.  Both failure modes look identical from here ("the operation
//! failed"), so one bounded loop couples them: restart on alternating
//! attempts, re-assert the administrative credential every attempt, and give
//! up only after the fixed budget is spent.  Per-attempt errors never escape
//! the loop; only a missing admin tool or exhaustion do.

use crate::config::BrokerCredential;
use crate::rabbitmqctl::{RabbitMqCtl, RabbitMqCtlError, DEFAULT_VHOST};
use crate::service::ServiceManager;
use host_utils::ExecutionError;
use slog::{info, warn, Logger};
use slog_error_chain::{InlineErrorChain, SlogInlineError};

/// Attempt budget for one restart/configure cycle, sized to absorb the
/// broker's startup flakiness without hanging a bring-up forever.
pub const MAX_ATTEMPTS: usize = 20;

/// Secondary vhost provisioned for a child deployment cell.
pub const CHILD_CELL_VHOST: &str = "child_cell";

/// A failure confined to a single convergence attempt.
#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum AttemptError {
    #[error("failed to restart broker service")]
    ServiceControl(#[source] ExecutionError),
    #[error("failed to ensure administrative user")]
    UserEnsure(#[source] RabbitMqCtlError),
    #[error("failed to grant administrative permissions")]
    PermissionGrant(#[source] RabbitMqCtlError),
    #[error("failed to reset administrative password")]
    PasswordReset(#[source] RabbitMqCtlError),
}

impl AttemptError {
    fn tool_unavailable(&self) -> bool {
        match self {
            AttemptError::UserEnsure(err)
            | AttemptError::PermissionGrant(err)
            | AttemptError::PasswordReset(err) => err.is_tool_unavailable(),
            AttemptError::ServiceControl(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum ConvergeError {
    #[error("broker administrative tool unavailable")]
    ToolUnavailable(#[source] AttemptError),
    #[error(
        "broker credential provisioning failed after {attempts} attempts"
    )]
    AttemptsExhausted {
        attempts: usize,
        #[source]
        last_error: AttemptError,
    },
}

pub struct ConvergenceEngine<'a> {
    services: &'a ServiceManager,
    ctl: &'a RabbitMqCtl,
    log: Logger,
}

impl<'a> ConvergenceEngine<'a> {
    pub fn new(
        services: &'a ServiceManager,
        ctl: &'a RabbitMqCtl,
        log: Logger,
    ) -> Self {
        Self { services, ctl, log }
    }

    /// Drives the broker until `credential` is in place or the attempt
    /// budget is exhausted.  Exhaustion is fatal to the provisioning run.
    pub async fn run(
        &self,
        credential: &BrokerCredential,
        child_cell_enabled: bool,
    ) -> Result<(), ConvergeError> {
        let mut attempt = 0;
        loop {
            match self.try_once(credential, attempt).await {
                Ok(()) => {
                    info!(
                        self.log, "broker credential state converged";
                        "user_id" => &credential.user_id,
                        "attempts" => attempt + 1,
                    );
                    break;
                }
                Err(err) if err.tool_unavailable() => {
                    return Err(ConvergeError::ToolUnavailable(err));
                }
                Err(err) => {
                    warn!(
                        self.log, "broker configuration attempt failed";
                        "attempt" => attempt,
                        "error" => %InlineErrorChain::new(&err),
                    );
                    attempt += 1;
                    if attempt == MAX_ATTEMPTS {
                        return Err(ConvergeError::AttemptsExhausted {
                            attempts: MAX_ATTEMPTS,
                            last_error: err,
                        });
                    }
                }
            }
        }

        if child_cell_enabled {
            self.ensure_child_cell_vhost(&credential.user_id).await;
        }
        Ok(())
    }

    async fn try_once(
        &self,
        credential: &BrokerCredential,
        attempt: usize,
    ) -> Result<(), AttemptError> {
        // Restart only on even attempts: a freshly restarted broker sometimes
        // needs one more cycle before its administrative interface answers,
        // so odd attempts retry against the running process instead.
        if attempt % 2 == 0 {
            self.services
                .restart()
                .await
                .map_err(AttemptError::ServiceControl)?;
        }

        self.ctl
            .ensure_user(&credential.user_id, &credential.password)
            .await
            .map_err(AttemptError::UserEnsure)?;
        self.ctl
            .grant_full_permissions(&credential.user_id, DEFAULT_VHOST)
            .await
            .map_err(AttemptError::PermissionGrant)?;
        // A broker that has just come up can accept the user creation yet
        // leave the default password in place; set it once more explicitly.
        self.ctl
            .change_password(&credential.user_id, &credential.password)
            .await
            .map_err(AttemptError::PasswordReset)?;
        Ok(())
    }

    // The administrative credential is already converged by the time this
    // runs; the child cell vhost is an enhancement, not a gate.
    async fn ensure_child_cell_vhost(&self, user_id: &str) {
        if let Err(err) =
            self.ctl.ensure_vhost(CHILD_CELL_VHOST, user_id).await
        {
            warn!(
                self.log, "failed to provision child cell vhost";
                "vhost" => CHILD_CELL_VHOST,
                "error" => %InlineErrorChain::new(&err),
            );
        }
    }
}
