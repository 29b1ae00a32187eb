//! Output formatting for CLI results
//!
//! Three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use syncpair_core::{PairingCode, PairingEvent, RegisteredDevice};

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    /// Whether the operation was successful
    pub success: bool,
    /// The response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Command that was executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    /// Create a successful response with command context
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
        }
    }
}

impl JsonResponse<()> {
    /// Create an error response with command context
    pub fn error_with_command(message: &str, command: &str) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
        }
    }
}

/// A code to show to the other device
#[derive(Debug, Clone, Serialize)]
pub struct CodeOutput {
    pub kind: &'static str,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// What a pairing code contains, without its secrets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedCode {
    pub kind: &'static str,
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_len: Option<usize>,
}

impl From<&PairingCode> for DecodedCode {
    fn from(code: &PairingCode) -> Self {
        let device_name = match code {
            PairingCode::ExchangeResponse(message) => Some(message.device_name.clone()),
            _ => None,
        };
        Self {
            kind: code.kind(),
            recipient_id: code.recipient_id().to_string(),
            device_name,
            public_key_len: code.recipient_public_key().map(<[u8]>::len),
        }
    }
}

/// A lifecycle event as reported to the user
#[derive(Debug, Clone, Serialize)]
pub struct EventOutput {
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<RegisteredDevice>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_sync_enabled: Option<bool>,
}

impl From<&PairingEvent> for EventOutput {
    fn from(event: &PairingEvent) -> Self {
        let mut out = Self {
            event: event.name(),
            error_kind: None,
            message: None,
            devices: None,
            show_sync_enabled: None,
        };
        match event {
            PairingEvent::Error { kind, source } => {
                out.error_kind = Some(kind.name());
                out.message = Some(match source {
                    Some(source) => format!("{kind} ({source})"),
                    None => kind.to_string(),
                });
            }
            PairingEvent::LoginCompleted { devices } => out.devices = Some(devices.clone()),
            PairingEvent::AccountConnectionCompleted { show_sync_enabled } => {
                out.show_sync_enabled = Some(*show_sync_enabled)
            }
            _ => {}
        }
        out
    }
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Get the current output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Format a code to display
    pub fn format_code(&self, code: &CodeOutput, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Property", "Value"]);
                table.add_row(vec!["Kind", code.kind]);
                table.add_row(vec!["Code", &code.code]);
                if let Some(link) = &code.link {
                    table.add_row(vec!["Link", link]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(code, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format decoded code details
    pub fn format_decoded(&self, decoded: &DecodedCode) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Property", "Value"]);
                table.add_row(vec!["Kind", decoded.kind]);
                table.add_row(vec!["Recipient ID", &decoded.recipient_id]);
                table.add_row(vec![
                    "Device Name",
                    decoded.device_name.as_deref().unwrap_or("-"),
                ]);
                table.add_row(vec![
                    "Public Key",
                    &decoded
                        .public_key_len
                        .map(|len| format!("{len} bytes"))
                        .unwrap_or_else(|| "-".to_string()),
                ]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(decoded, "decode"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a device list
    pub fn format_devices(&self, devices: &[RegisteredDevice]) -> String {
        match self.format {
            OutputFormat::Table => devices_table(devices),
            OutputFormat::Json => self.to_json_response(&devices, "devices"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a lifecycle event as one line (table) or one JSON object
    pub fn format_event(&self, event: &PairingEvent) -> String {
        match self.format {
            OutputFormat::Table => match event {
                PairingEvent::CodeRecognized => "Code recognized".to_string(),
                PairingEvent::WillBeginTransmittingRecoveryKey => {
                    "Sending recovery key to the other device...".to_string()
                }
                PairingEvent::DidFinishTransmittingRecoveryKey => {
                    "Finished sending recovery key".to_string()
                }
                PairingEvent::RecoveryKeyReceived => "Recovery key received".to_string(),
                PairingEvent::AccountCreated => "Created a new sync account".to_string(),
                PairingEvent::AccountConnectionCompleted { .. } => {
                    "The other device is now connected".to_string()
                }
                PairingEvent::LoginCompleted { devices } => {
                    format!("Signed in\n{}", devices_table(devices))
                }
                PairingEvent::TwoAccountsFoundDuringRecovery { .. } => {
                    "This device is signed in to another account; sign out first to switch"
                        .to_string()
                }
                PairingEvent::Error { kind, source } => match source {
                    Some(source) if self.verbose => format!("Error: {kind} ({source})"),
                    _ => format!("Error: {kind}"),
                },
            },
            OutputFormat::Json => self.to_json(&EventOutput::from(event)),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error with exit code context
    pub fn format_error_with_code(&self, message: &str, code: ExitCode, command: &str) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {message}"),
            OutputFormat::Json => {
                let response = JsonResponse::error_with_command(message, command);
                let mut output = match serde_json::to_value(&response) {
                    Ok(value) => value,
                    Err(e) => return format!("{{\"error\": \"{e}\"}}"),
                };
                output["exit_code"] = serde_json::json!(code as i32);
                output["exit_code_name"] = serde_json::json!(code.name());
                self.to_json(&output)
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a generic success result
    pub fn format_success<T: Serialize>(&self, data: &T, command: &str) -> String {
        match self.format {
            OutputFormat::Table => String::new(),
            OutputFormat::Json => self.to_json_response(data, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Print a line unless quiet
    pub fn print(&self, text: &str) {
        if !text.is_empty() {
            println!("{text}");
        }
    }

    /// Progress message (only shown in verbose table mode)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    /// Success message
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    /// Error message
    pub fn error(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("✗ {message}");
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        self.to_json(&JsonResponse::success_with_command(value, command))
    }
}

fn devices_table(devices: &[RegisteredDevice]) -> String {
    if devices.is_empty() {
        return "No devices.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Device ID", "Name", "Type"]);
    for device in devices {
        table.add_row(vec![&device.id, &device.name, &device.device_type]);
    }
    table.to_string()
}
