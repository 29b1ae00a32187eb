//! Drives pairing flows from the command line.
//!
//! Wraps a [`PairingController`], prints its events as they arrive and turns the end of a
//! flow into an [`ExitCode`]. The controller never gives up on its own, so every wait here
//! is bounded by an optional timeout and by Ctrl-C, after which the session is stopped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use syncpair_core::errors::AccountError;
use syncpair_core::http_relay::HttpRelayClient;
use syncpair_core::{
    AccountService, ActivationError, EventReceiver, PairingCode, PairingController, PairingError, PairingEvent,
};
use syncpair_crypto::BoxCrypter;
use tracing::{debug, info};
use url::Url;

use crate::account::LocalAccountService;
use crate::config::Config;
use crate::output::{CodeOutput, OutputFormatter};
use crate::ExitCode;

/// How a wait for the other device ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done(ExitCode),
    TimedOut,
    Interrupted,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Done(code) => code,
            Outcome::TimedOut => ExitCode::Timeout,
            Outcome::Interrupted => ExitCode::GeneralError,
        }
    }
}

pub struct PairingRunner {
    controller: PairingController,
    events: EventReceiver,
    accounts: Arc<dyn AccountService>,
    formatter: OutputFormatter,
}

impl PairingRunner {
    pub fn new(
        controller: PairingController,
        events: EventReceiver,
        accounts: Arc<dyn AccountService>,
        formatter: OutputFormatter,
    ) -> Self {
        Self {
            controller,
            events,
            accounts,
            formatter,
        }
    }

    /// Build a runner talking to the configured relay and account file.
    pub fn from_config(config: &Config, formatter: OutputFormatter, source: &str) -> anyhow::Result<Self> {
        let relay = HttpRelayClient::new(
            config.relay.base_url.clone(),
            Some(Duration::from_secs(config.relay.request_timeout_secs)),
        )
        .context("failed to create relay client")?;

        let store_path = config
            .account_store_path()
            .context("no account file location; set account.store_path")?;
        let accounts: Arc<dyn AccountService> = Arc::new(
            LocalAccountService::open(&store_path)
                .with_context(|| format!("failed to open account file {}", store_path.display()))?,
        );

        info!(relay = %config.relay.base_url, account_file = %store_path.display(), "pairing runner ready");
        let (controller, events) = PairingController::new(
            Arc::new(relay),
            Arc::new(BoxCrypter),
            accounts.clone(),
            config.pairing_config(source),
        );
        Ok(Self::new(controller, events, accounts, formatter))
    }

    pub fn controller(&self) -> &PairingController {
        &self.controller
    }

    pub fn formatter(&self) -> &OutputFormatter {
        &self.formatter
    }

    /// Show an exchange invite and wait until the recovery key has been sent.
    pub async fn exchange(&mut self, timeout: Option<Duration>, link_base: Option<&Url>) -> anyhow::Result<ExitCode> {
        if self.accounts.current_account().is_none() {
            self.formatter
                .error("This device is not signed in; there is no recovery key to send");
            return Ok(ExitCode::NoAccount);
        }

        let code = self.controller.start_exchange_mode()?;
        self.show_code("exchange_key", code, link_base, "exchange")?;
        self.formatter.progress("Waiting for the other device to enter the code...");

        let mut first_error = None;
        let outcome = self
            .wait(timeout, |event| match event {
                PairingEvent::Error { kind, .. } => {
                    let code = ExitCode::from(*kind);
                    first_error.get_or_insert(code);
                    // A transmit failure is followed by the finish event.
                    if *kind == ActivationError::FailedToTransmitExchangeRecoveryKey {
                        None
                    } else {
                        Some(code)
                    }
                }
                PairingEvent::DidFinishTransmittingRecoveryKey => {
                    Some(first_error.unwrap_or(ExitCode::Success))
                }
                _ => None,
            })
            .await;

        self.controller.stop_exchange_mode();
        Ok(self.finish(outcome, "exchange"))
    }

    /// Show a connect invite and wait until this device is signed in.
    pub async fn connect(&mut self, timeout: Option<Duration>, link_base: Option<&Url>) -> anyhow::Result<ExitCode> {
        let code = match self.controller.start_connect_mode() {
            Ok(code) => code,
            Err(PairingError::Account(AccountError::AlreadyExists)) => {
                self.formatter.error("This device is already signed in");
                return Ok(ExitCode::AccountExists);
            }
            Err(e) => return Err(e.into()),
        };
        self.show_code("connect", code, link_base, "connect")?;
        self.formatter.progress("Waiting for the other device to enter the code...");

        let outcome = self
            .wait(timeout, |event| match event {
                PairingEvent::LoginCompleted { .. } => Some(ExitCode::Success),
                other => ExitCode::for_event(other),
            })
            .await;

        self.controller.stop_connect_mode();
        Ok(self.finish(outcome, "connect"))
    }

    /// Handle a code or link shown by the other device.
    pub async fn enter(&mut self, code: &str, timeout: Option<Duration>) -> anyhow::Result<ExitCode> {
        let Self {
            controller,
            events,
            formatter,
            ..
        } = self;

        let entered = controller.code_entered(code);
        tokio::pin!(entered);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        let mut last_error = None;
        let mut timed_out = false;
        let handled = loop {
            tokio::select! {
                handled = &mut entered => break handled,
                Some(event) = events.recv() => {
                    last_error = ExitCode::for_event(&event).or(last_error);
                    formatter.print(&formatter.format_event(&event));
                }
                _ = sleep_until(deadline), if !timed_out => {
                    debug!("timed out waiting for the other device");
                    timed_out = true;
                    controller.stop_exchange_mode();
                }
            }
        };

        while let Ok(event) = events.try_recv() {
            last_error = ExitCode::for_event(&event).or(last_error);
            formatter.print(&formatter.format_event(&event));
        }

        let code = if handled {
            ExitCode::Success
        } else if timed_out {
            ExitCode::Timeout
        } else {
            last_error.unwrap_or(ExitCode::GeneralError)
        };
        if code == ExitCode::Success {
            formatter.print(&formatter.format_success(&serde_json::json!({ "handled": true }), "enter"));
        }
        Ok(code)
    }

    fn show_code(
        &self,
        kind: &'static str,
        code: String,
        link_base: Option<&Url>,
        command: &str,
    ) -> anyhow::Result<()> {
        let link = link_base
            .map(|base| self.controller.pairing_link(&code, base))
            .transpose()?
            .map(String::from);
        self.formatter
            .print(&self.formatter.format_code(&CodeOutput { kind, code, link }, command));
        Ok(())
    }

    /// Print events until `step` names an exit code, the timeout elapses or Ctrl-C.
    async fn wait<F>(&mut self, timeout: Option<Duration>, mut step: F) -> Outcome
    where
        F: FnMut(&PairingEvent) -> Option<ExitCode>,
    {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let events = &mut self.events;
        let formatter = &self.formatter;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        formatter.print(&formatter.format_event(&event));
                        if let Some(code) = step(&event) {
                            return Outcome::Done(code);
                        }
                    }
                    None => return Outcome::Done(ExitCode::GeneralError),
                },
                _ = sleep_until(deadline) => return Outcome::TimedOut,
                _ = tokio::signal::ctrl_c() => return Outcome::Interrupted,
            }
        }
    }

    fn finish(&self, outcome: Outcome, command: &str) -> ExitCode {
        let code = outcome.exit_code();
        match outcome {
            Outcome::TimedOut => self.formatter.print(&self.formatter.format_error_with_code(
                "the other device did not answer in time",
                code,
                command,
            )),
            Outcome::Interrupted => self.formatter.print(&self.formatter.format_error_with_code(
                "interrupted",
                code,
                command,
            )),
            Outcome::Done(ExitCode::Success) => self.formatter.success("Done"),
            Outcome::Done(_) => {}
        }
        code
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
