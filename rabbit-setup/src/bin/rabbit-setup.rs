// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI driving the broker lifecycle steps of an environment bring-up

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use host_utils::HostExecutor;
use rabbit_setup::cmd::{fatal, CmdError};
use rabbit_setup::{transport, RabbitSetup, SetupConfig};
use slog::info;

#[derive(Debug, Parser)]
struct RabbitSetupCli {
    /// Path to the resolved setup configuration
    #[arg(short, long)]
    config: Utf8PathBuf,
    #[command(subcommand)]
    command: RabbitSetupCommand,
}

#[derive(Debug, Subcommand)]
enum RabbitSetupCommand {
    /// Removes the broker and purges its runtime packages
    Cleanup,
    /// Installs the broker package
    Install,
    /// Restarts the broker and converges its administrative credential
    Configure,
    /// Writes broker connection settings into a consumer config file
    ExportConfig(ExportConfigArgs),
}

#[derive(Debug, Args)]
struct ExportConfigArgs {
    /// config file receiving the assignments
    #[arg(short, long)]
    file: Utf8PathBuf,
    /// section the assignments are written under
    #[arg(short, long, default_value = "oslo_messaging_rabbit")]
    section: String,
}

#[tokio::main]
async fn main() {
    if let Err(err) = do_run().await {
        fatal(CmdError::Failure(err));
    }
}

async fn do_run() -> anyhow::Result<()> {
    let log = dropshot::ConfigLogging::File {
        path: "/dev/stderr".into(),
        level: dropshot::ConfigLoggingLevel::Info,
        if_exists: dropshot::ConfigLoggingIfExists::Append,
    }
    .to_logger("rabbit-setup")
    .context("failed to construct stderr logger")?;

    let args = RabbitSetupCli::parse();
    let config = SetupConfig::from_file(&args.config)?;
    let executor =
        HostExecutor::new(log.new(slog::o!("component" => "HostExecutor")))
            .as_executor();
    let setup = RabbitSetup::new(config, executor, log.clone());

    match args.command {
        RabbitSetupCommand::Cleanup => setup.cleanup().await?,
        RabbitSetupCommand::Install => setup.install().await?,
        RabbitSetupCommand::Configure => {
            setup.restart_and_configure().await?;
            if let Some(url) = transport::transport_url(setup.config())? {
                info!(log, "broker ready"; "transport_url" => url);
            }
        }
        RabbitSetupCommand::ExportConfig(args) => {
            setup.export_config(&args.file, &args.section)?
        }
    }
    Ok(())
}
