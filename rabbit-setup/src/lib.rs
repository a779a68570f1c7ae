// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Provisioning and configuration of a RabbitMQ message broker as one step
//! of an automated environment bring-up.
//!
//! The orchestrator drives four lifecycle operations (cleanup, install,
//! restart/configure, config export) through [`RabbitSetup`].  The hard part
//! lives in [`converge`]: a bounded retry loop that restarts the broker and
//! idempotently asserts a single administrative credential, tolerating the
//! broker's tendency to come up with its administrative interface not yet
//! answering.

pub mod cmd;
pub mod config;
pub mod converge;
pub mod ini;
pub mod lifecycle;
pub mod rabbitmqctl;
pub mod service;
pub mod transport;

pub use config::BackendSelection;
pub use config::BrokerCredential;
pub use config::ConfigError;
pub use config::SetupConfig;
pub use converge::ConvergeError;
pub use converge::ConvergenceEngine;
pub use converge::MAX_ATTEMPTS;
pub use lifecycle::RabbitSetup;
pub use lifecycle::SetupError;
pub use rabbitmqctl::RabbitMqCtl;
pub use rabbitmqctl::RabbitMqCtlError;
pub use service::ServiceManager;
