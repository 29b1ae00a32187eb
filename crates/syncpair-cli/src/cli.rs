//! CLI command definitions and argument parsing

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use syncpair_core::link::decode_entered;
use url::Url;

use crate::account::LocalAccountService;
use crate::config::Config;
use crate::output::{DecodedCode, OutputFormat, OutputFormatter};
use crate::runner::PairingRunner;
use crate::ExitCode;

/// Source recorded with accounts created from the command line
const SOURCE: &str = "cli";

/// syncpair - pair this device with a sync account
#[derive(Parser, Debug)]
#[command(name = "syncpair")]
#[command(version, about = "syncpair - pair devices and exchange sync recovery keys")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Relay base URL
    #[arg(long = "relay-url", env = "SYNCPAIR_RELAY_URL", global = true)]
    pub relay_url: Option<String>,

    /// Name shown to the other device
    #[arg(long = "device-name", global = true)]
    pub device_name: Option<String>,

    /// Account file path
    #[arg(long = "account-file", global = true)]
    pub account_file: Option<PathBuf>,
}

impl Cli {
    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(self.output, config.output.verbose);

        match self.command {
            Commands::Exchange(args) => {
                let mut runner = PairingRunner::from_config(&config, formatter, SOURCE)?;
                let base = args.link.then(|| link_base(&config)).transpose()?;
                runner.exchange(args.timeout(), base.as_ref()).await
            }
            Commands::Connect(args) => {
                let mut runner = PairingRunner::from_config(&config, formatter, SOURCE)?;
                let base = args.link.then(|| link_base(&config)).transpose()?;
                runner.connect(args.timeout(), base.as_ref()).await
            }
            Commands::Enter { code, timeout } => {
                let mut runner = PairingRunner::from_config(&config, formatter, SOURCE)?;
                runner
                    .enter(&code, timeout.map(Duration::from_secs))
                    .await
            }
            Commands::Decode { code } => {
                match decode_entered(&code, config.relay.link_host.as_deref()) {
                    Ok(decoded) => {
                        formatter.print(&formatter.format_decoded(&DecodedCode::from(&decoded)));
                        Ok(ExitCode::Success)
                    }
                    Err(e) => {
                        formatter.print(&formatter.format_error_with_code(
                            &format!("Failed to decode code: {e}"),
                            ExitCode::InvalidInput,
                            "decode",
                        ));
                        Ok(ExitCode::InvalidInput)
                    }
                }
            }
            Commands::RecoveryCode => {
                let runner = PairingRunner::from_config(&config, formatter, SOURCE)?;
                let code = runner.controller().recovery_code();
                if code.is_empty() {
                    runner.formatter().error("This device is not signed in");
                    return Ok(ExitCode::NoAccount);
                }
                runner.formatter().print(&runner.formatter().format_code(
                    &crate::output::CodeOutput {
                        kind: "recovery",
                        code,
                        link: None,
                    },
                    "recovery-code",
                ));
                Ok(ExitCode::Success)
            }
            Commands::SignOut => {
                let path = config
                    .account_store_path()
                    .context("no account file location; set account.store_path")?;
                let accounts = LocalAccountService::open(path)?;
                accounts.sign_out()?;
                formatter.success("Signed out");
                Ok(ExitCode::Success)
            }
            Commands::Config(action) => action.execute(&config, self.config.as_deref(), &formatter),
        }
    }
}

/// Base URL pairing links are built on
fn link_base(config: &Config) -> anyhow::Result<Url> {
    let base = match config.relay.link_host.as_deref().filter(|h| !h.is_empty()) {
        Some(host) => format!("https://{host}/"),
        None => {
            let relay = Url::parse(&config.relay.base_url).context("invalid relay URL")?;
            let host = relay.host_str().context("relay URL has no host")?;
            format!("{}://{host}/", relay.scheme())
        }
    };
    Url::parse(&base).context("invalid link host")
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show an exchange code and send this account's recovery key to the device that enters it
    Exchange(WaitArgs),
    /// Show a connect code and sign in with the recovery key the other device sends
    Connect(WaitArgs),
    /// Enter a code or pairing link shown by the other device
    Enter {
        /// Code or pairing link
        code: String,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show what a code or pairing link contains
    Decode {
        /// Code or pairing link
        code: String,
    },
    /// Print this device's recovery code
    RecoveryCode,
    /// Forget the account stored on this device
    SignOut,
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigAction),
}

/// Arguments for commands that wait for the other device
#[derive(Parser, Debug)]
pub struct WaitArgs {
    /// Give up after this many seconds (0 = wait until interrupted)
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Also print a pairing link for the code
    #[arg(long)]
    pub link: bool,
}

impl WaitArgs {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a sample configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path
    Path,
}

impl ConfigAction {
    pub fn execute(
        self,
        config: &Config,
        custom_path: Option<&std::path::Path>,
        formatter: &OutputFormatter,
    ) -> anyhow::Result<ExitCode> {
        let path = custom_path
            .map(PathBuf::from)
            .or_else(Config::default_path);

        match self {
            ConfigAction::Show => {
                if formatter.format() == OutputFormat::Json {
                    formatter.print(&formatter.format_success(config, "config"));
                } else {
                    let text = toml::to_string_pretty(config).context("failed to serialize config")?;
                    formatter.print(&text);
                }
                Ok(ExitCode::Success)
            }
            ConfigAction::Init { force } => {
                let Some(path) = path else {
                    formatter.error("Could not determine a configuration directory");
                    return Ok(ExitCode::GeneralError);
                };
                if path.exists() && !force {
                    formatter.error(&format!(
                        "{} already exists; use --force to overwrite",
                        path.display()
                    ));
                    return Ok(ExitCode::InvalidInput);
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                std::fs::write(&path, Config::sample_toml())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                formatter.success(&format!("Wrote {}", path.display()));
                Ok(ExitCode::Success)
            }
            ConfigAction::Path => {
                match path {
                    Some(path) => formatter.print(&path.display().to_string()),
                    None => formatter.error("Could not determine a configuration directory"),
                }
                Ok(ExitCode::Success)
            }
        }
    }
}
