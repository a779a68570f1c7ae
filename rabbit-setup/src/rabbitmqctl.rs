// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wrapper around the broker's administrative CLI.
//!
//! Every operation here mutates live broker state except the listing
//! queries.  Mutations are idempotent by broker semantics, which is what the
//! convergence loop relies on: it re-asserts the target state rather than
//! diffing or rolling back.

use camino::Utf8PathBuf;
use host_utils::{BoxedExecutor, ExecutionError};
use rabbit_admin_types::{ParseError, UserEntry};
use slog_error_chain::SlogInlineError;
use std::process::Output;
use tokio::process::Command;

/// The default vhost every broker ships with.
pub const DEFAULT_VHOST: &str = "/";

// Unrestricted configure/write/read pattern granted to the administrative
// user.
const FULL_PERMISSIONS: &str = ".*";

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum RabbitMqCtlError {
    #[error(transparent)]
    ExecutionError(#[from] ExecutionError),
    #[error(
        "failed to parse `rabbitmqctl {subcommand}` output: \
         stdout {stdout:?}, stderr {stderr:?}"
    )]
    ParseOutput {
        subcommand: &'static str,
        stdout: String,
        stderr: String,
        #[source]
        err: ParseError,
    },
}

impl RabbitMqCtlError {
    /// Whether the administrative CLI itself could not be invoked (missing
    /// binary, permission denied), as opposed to an operation the broker
    /// rejected.  The former cannot be retried into existence.
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(
            self,
            RabbitMqCtlError::ExecutionError(
                ExecutionError::ExecutionStart { .. }
            )
        )
    }
}

pub struct RabbitMqCtl {
    binary_path: Utf8PathBuf,
    executor: BoxedExecutor,
}

impl RabbitMqCtl {
    pub fn new(binary_path: Utf8PathBuf, executor: BoxedExecutor) -> Self {
        Self { binary_path, executor }
    }

    pub async fn list_users(
        &self,
    ) -> Result<Vec<UserEntry>, RabbitMqCtlError> {
        let output = self.invoke_ctl(["list_users", "-q"]).await?;
        UserEntry::parse_from_table(&output.stdout).map_err(|err| {
            RabbitMqCtlError::ParseOutput {
                subcommand: "list_users",
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                err,
            }
        })
    }

    /// Idempotently asserts that `user_id` exists with `password`: an
    /// existing user has its password changed, a missing one is created.
    ///
    /// The lookup-then-branch is atomic only at the granularity of the
    /// caller's retry loop; broker-side races are absorbed by retrying the
    /// whole cycle, not by locking here.
    pub async fn ensure_user(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<(), RabbitMqCtlError> {
        let users = self.list_users().await?;
        if users.iter().any(|user| user.name == user_id) {
            self.change_password(user_id, password).await
        } else {
            self.add_user(user_id, password).await
        }
    }

    pub async fn change_password(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<(), RabbitMqCtlError> {
        self.invoke_ctl(["change_password", user_id, password]).await?;
        Ok(())
    }

    /// Grants the unrestricted permission triple to `user_id` on `vhost`.
    /// Safe to call repeatedly; the broker treats this as an upsert.
    pub async fn grant_full_permissions(
        &self,
        user_id: &str,
        vhost: &str,
    ) -> Result<(), RabbitMqCtlError> {
        self.invoke_ctl([
            "set_permissions",
            "-p",
            vhost,
            user_id,
            FULL_PERMISSIONS,
            FULL_PERMISSIONS,
            FULL_PERMISSIONS,
        ])
        .await?;
        Ok(())
    }

    pub async fn list_vhosts(&self) -> Result<Vec<String>, RabbitMqCtlError> {
        let output = self.invoke_ctl(["list_vhosts", "-q"]).await?;
        rabbit_admin_types::parse_vhosts(&output.stdout).map_err(|err| {
            RabbitMqCtlError::ParseOutput {
                subcommand: "list_vhosts",
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                err,
            }
        })
    }

    /// Creates `name` only if it is absent, then grants `user_id` the full
    /// permission triple on it.
    pub async fn ensure_vhost(
        &self,
        name: &str,
        user_id: &str,
    ) -> Result<(), RabbitMqCtlError> {
        let vhosts = self.list_vhosts().await?;
        if !vhosts.iter().any(|vhost| vhost == name) {
            self.invoke_ctl(["add_vhost", name]).await?;
        }
        self.grant_full_permissions(user_id, name).await
    }

    async fn add_user(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<(), RabbitMqCtlError> {
        self.invoke_ctl(["add_user", user_id, password]).await?;
        Ok(())
    }

    async fn invoke_ctl<'a, I>(
        &self,
        args: I,
    ) -> Result<Output, RabbitMqCtlError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut command = Command::new(&self.binary_path);
        for arg in args {
            command.arg(arg);
        }
        Ok(self.executor.execute_async(&mut command).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use host_utils::{
        FakeExecutor, HostExecutor, Input, OutputExt, StaticHandler,
    };
    use rabbit_test_utils::test_setup_log;

    fn ctl(executor: BoxedExecutor) -> RabbitMqCtl {
        RabbitMqCtl::new("rabbitmqctl".into(), executor)
    }

    #[tokio::test]
    async fn ensure_user_changes_password_when_user_exists() {
        let logctx =
            test_setup_log("ensure_user_changes_password_when_user_exists");
        let executor = FakeExecutor::new(logctx.log.clone());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("rabbitmqctl list_users -q"),
            Output::success().set_stdout("guest\t[administrator]\nstackrabbit\t[]\n"),
        );
        handler.expect_ok("rabbitmqctl change_password stackrabbit secret");
        handler.register(&executor);

        ctl(executor.as_executor())
            .ensure_user("stackrabbit", "secret")
            .await
            .expect("user ensured");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn ensure_user_creates_missing_user() {
        let logctx = test_setup_log("ensure_user_creates_missing_user");
        let executor = FakeExecutor::new(logctx.log.clone());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("rabbitmqctl list_users -q"),
            Output::success().set_stdout("guest\t[administrator]\n"),
        );
        handler.expect_ok("rabbitmqctl add_user stackrabbit secret");
        handler.register(&executor);

        ctl(executor.as_executor())
            .ensure_user("stackrabbit", "secret")
            .await
            .expect("user ensured");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn ensure_user_twice_never_duplicates() {
        let logctx = test_setup_log("ensure_user_twice_never_duplicates");
        let executor = FakeExecutor::new(logctx.log.clone());

        // First call creates the user; the second sees it listed and only
        // changes the password.  No second `add_user` is ever issued.
        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("rabbitmqctl list_users -q"),
            Output::success().set_stdout("guest\t[administrator]\n"),
        );
        handler.expect_ok("rabbitmqctl add_user stackrabbit secret");
        handler.expect(
            Input::shell("rabbitmqctl list_users -q"),
            Output::success()
                .set_stdout("guest\t[administrator]\nstackrabbit\t[]\n"),
        );
        handler.expect_ok("rabbitmqctl change_password stackrabbit secret");
        handler.register(&executor);

        let ctl = ctl(executor.as_executor());
        ctl.ensure_user("stackrabbit", "secret").await.expect("created");
        ctl.ensure_user("stackrabbit", "secret").await.expect("converged");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn ensure_vhost_skips_create_when_present() {
        let logctx = test_setup_log("ensure_vhost_skips_create_when_present");
        let executor = FakeExecutor::new(logctx.log.clone());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("rabbitmqctl list_vhosts -q"),
            Output::success().set_stdout("/\nchild_cell\n"),
        );
        handler.expect_ok(
            "rabbitmqctl set_permissions -p child_cell stackrabbit .* .* .*",
        );
        handler.register(&executor);

        ctl(executor.as_executor())
            .ensure_vhost("child_cell", "stackrabbit")
            .await
            .expect("vhost ensured");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn ensure_vhost_creates_missing_vhost() {
        let logctx = test_setup_log("ensure_vhost_creates_missing_vhost");
        let executor = FakeExecutor::new(logctx.log.clone());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("rabbitmqctl list_vhosts -q"),
            Output::success().set_stdout("/\n"),
        );
        handler.expect_ok("rabbitmqctl add_vhost child_cell");
        handler.expect_ok(
            "rabbitmqctl set_permissions -p child_cell stackrabbit .* .* .*",
        );
        handler.register(&executor);

        ctl(executor.as_executor())
            .ensure_vhost("child_cell", "stackrabbit")
            .await
            .expect("vhost ensured");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn missing_binary_is_tool_unavailable() {
        let logctx = test_setup_log("missing_binary_is_tool_unavailable");
        let executor = HostExecutor::new(logctx.log.clone()).as_executor();

        let ctl =
            RabbitMqCtl::new("/nonexistent/rabbitmqctl".into(), executor);
        let err = ctl.list_users().await.expect_err("tool missing");
        assert!(err.is_tool_unavailable(), "unexpected error: {err}");

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn rejected_operation_is_not_tool_unavailable() {
        let logctx =
            test_setup_log("rejected_operation_is_not_tool_unavailable");
        let executor = FakeExecutor::new(logctx.log.clone());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("rabbitmqctl list_users -q"),
            Output::failure().set_stderr("Error: unable to connect to node\n"),
        );
        handler.register(&executor);

        let err = ctl(executor.as_executor())
            .list_users()
            .await
            .expect_err("operation rejected");
        assert!(!err.is_tool_unavailable(), "unexpected error: {err}");

        logctx.cleanup_successful();
    }
}
