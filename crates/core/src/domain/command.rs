// OBD Command Domain Model
//
// Commands are ELM327 text requests: "AT .." lines configure the adapter,
// hex byte strings ("01 0C") are diagnostic requests forwarded to the ECU.

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Service 01 (current data) PIDs with a known decoding
pub mod pid {
    pub const ENGINE_LOAD: u8 = 0x04;
    pub const COOLANT_TEMPERATURE: u8 = 0x05;
    pub const ENGINE_RPM: u8 = 0x0C;
    pub const VEHICLE_SPEED: u8 = 0x0D;
    pub const INTAKE_AIR_TEMPERATURE: u8 = 0x0F;
    pub const THROTTLE_POSITION: u8 = 0x11;
    pub const AMBIENT_AIR_TEMPERATURE: u8 = 0x46;
}

/// Mode 01: show current data
pub const MODE_CURRENT_DATA: u8 = 0x01;

/// Positive responses echo the mode with this bit set
const RESPONSE_MODE_OFFSET: u8 = 0x40;

/// Adapter replies that mean the request did not produce data
const ADAPTER_ERRORS: &[&str] = &[
    "NO DATA",
    "UNABLE TO CONNECT",
    "STOPPED",
    "CAN ERROR",
    "BUS ERROR",
    "BUS BUSY",
    "FB ERROR",
    "DATA ERROR",
    "BUFFER FULL",
];

/// OBD protocol selectable with `AT SP n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObdProtocol {
    Auto,
    SaeJ1850Pwm,
    SaeJ1850Vpw,
    Iso9141,
    Iso14230Kwp,
    Iso14230KwpFast,
    Iso15765Can11Bit500,
    Iso15765Can29Bit500,
    Iso15765Can11Bit250,
    Iso15765Can29Bit250,
    SaeJ1939Can,
}

impl ObdProtocol {
    /// Protocol number as understood by the adapter
    pub fn code(&self) -> char {
        match self {
            ObdProtocol::Auto => '0',
            ObdProtocol::SaeJ1850Pwm => '1',
            ObdProtocol::SaeJ1850Vpw => '2',
            ObdProtocol::Iso9141 => '3',
            ObdProtocol::Iso14230Kwp => '4',
            ObdProtocol::Iso14230KwpFast => '5',
            ObdProtocol::Iso15765Can11Bit500 => '6',
            ObdProtocol::Iso15765Can29Bit500 => '7',
            ObdProtocol::Iso15765Can11Bit250 => '8',
            ObdProtocol::Iso15765Can29Bit250 => '9',
            ObdProtocol::SaeJ1939Can => 'A',
        }
    }
}

impl std::str::FromStr for ObdProtocol {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let protocol = match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" | "0" => ObdProtocol::Auto,
            "SAE_J1850_PWM" | "1" => ObdProtocol::SaeJ1850Pwm,
            "SAE_J1850_VPW" | "2" => ObdProtocol::SaeJ1850Vpw,
            "ISO9141" | "3" => ObdProtocol::Iso9141,
            "ISO14230_KWP" | "4" => ObdProtocol::Iso14230Kwp,
            "ISO14230_KWP_FAST" | "5" => ObdProtocol::Iso14230KwpFast,
            "ISO15765_CAN11_BIT500" | "6" => ObdProtocol::Iso15765Can11Bit500,
            "ISO15765_CAN29_BIT500" | "7" => ObdProtocol::Iso15765Can29Bit500,
            "ISO15765_CAN11_BIT250" | "8" => ObdProtocol::Iso15765Can11Bit250,
            "ISO15765_CAN29_BIT250" | "9" => ObdProtocol::Iso15765Can29Bit250,
            "SAE_J1939_CAN" | "A" => ObdProtocol::SaeJ1939Can,
            other => {
                return Err(DomainError::InvalidCommand(format!(
                    "unknown OBD protocol: {}",
                    other
                )))
            }
        };
        Ok(protocol)
    }
}

/// What kind of request a command is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Adapter configuration, answered by the ELM327 itself
    At,
    /// Service request without PID (e.g. 03 = stored trouble codes)
    Mode { mode: u8 },
    /// Service request for a single PID
    Pid { mode: u8, pid: u8 },
}

/// A command sent to the OBD adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObdCommand {
    pub name: String,
    pub raw: String,
    pub kind: CommandKind,
}

impl ObdCommand {
    fn at(name: &str, raw: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            raw: raw.into(),
            kind: CommandKind::At,
        }
    }

    fn current_data(name: &str, pid: u8) -> Self {
        Self {
            name: name.to_string(),
            raw: format!("{:02X} {:02X}", MODE_CURRENT_DATA, pid),
            kind: CommandKind::Pid {
                mode: MODE_CURRENT_DATA,
                pid,
            },
        }
    }

    /// Parse a user supplied command text.
    ///
    /// Text starting with `AT` is an adapter command; anything else must be
    /// one or two hex bytes (mode, optional PID), spaces allowed.
    pub fn raw(name: impl Into<String>, text: &str) -> Result<Self> {
        let text = text.trim().to_ascii_uppercase();
        if text.is_empty() {
            return Err(DomainError::InvalidCommand("empty command".to_string()));
        }

        if text.starts_with("AT") {
            return Ok(Self {
                name: name.into(),
                raw: text,
                kind: CommandKind::At,
            });
        }

        let bytes = decode_hex(&text).ok_or_else(|| {
            DomainError::InvalidCommand(format!("not an AT command or hex request: {}", text))
        })?;

        let kind = match bytes.as_slice() {
            [mode] => CommandKind::Mode { mode: *mode },
            [mode, pid] => CommandKind::Pid {
                mode: *mode,
                pid: *pid,
            },
            _ => {
                return Err(DomainError::InvalidCommand(format!(
                    "expected mode and optional PID, got {} bytes",
                    bytes.len()
                )))
            }
        };

        let raw = bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Self {
            name: name.into(),
            raw,
            kind,
        })
    }

    // Adapter initialization

    pub fn reset() -> Self {
        Self::at("Reset OBD", "AT Z")
    }

    pub fn echo_off() -> Self {
        Self::at("Echo Off", "AT E0")
    }

    pub fn line_feed_off() -> Self {
        Self::at("Line Feed Off", "AT L0")
    }

    /// Adapter response timeout. The ELM327 counts in units of 4ms.
    pub fn timeout(millis: u32) -> Self {
        let units = (millis / 4).min(u32::from(u8::MAX));
        Self::at("Timeout", format!("AT ST {:02X}", units))
    }

    pub fn select_protocol(protocol: ObdProtocol) -> Self {
        Self::at("Select Protocol", format!("AT SP {}", protocol.code()))
    }

    // Current data

    pub fn engine_load() -> Self {
        Self::current_data("Engine Load", pid::ENGINE_LOAD)
    }

    pub fn coolant_temperature() -> Self {
        Self::current_data("Engine Coolant Temperature", pid::COOLANT_TEMPERATURE)
    }

    pub fn engine_rpm() -> Self {
        Self::current_data("Engine RPM", pid::ENGINE_RPM)
    }

    pub fn vehicle_speed() -> Self {
        Self::current_data("Vehicle Speed", pid::VEHICLE_SPEED)
    }

    pub fn intake_air_temperature() -> Self {
        Self::current_data("Air Intake Temperature", pid::INTAKE_AIR_TEMPERATURE)
    }

    pub fn throttle_position() -> Self {
        Self::current_data("Throttle Position", pid::THROTTLE_POSITION)
    }

    pub fn ambient_air_temperature() -> Self {
        Self::current_data("Ambient Air Temperature", pid::AMBIENT_AIR_TEMPERATURE)
    }
}

impl std::fmt::Display for ObdCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.raw)
    }
}

/// Decoded adapter response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObdResponse {
    /// Response text with prompt and status noise removed
    pub raw: String,
    /// Data bytes following the mode/PID header (empty for AT commands)
    pub data: Vec<u8>,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

impl ObdResponse {
    /// Parse the text the adapter returned for `command`.
    pub fn parse(command: &ObdCommand, raw: &str) -> Result<Self> {
        let lines = response_lines(command, raw);
        let text = lines.join("\n");

        if let Some(message) = adapter_error(&lines) {
            return Err(DomainError::AdapterError {
                command: command.raw.clone(),
                message,
            });
        }

        let (mode, pid) = match command.kind {
            CommandKind::At => {
                return Ok(Self {
                    raw: text,
                    data: Vec::new(),
                    value: None,
                    unit: None,
                })
            }
            CommandKind::Mode { mode } => (mode, None),
            CommandKind::Pid { mode, pid } => (mode, Some(pid)),
        };

        let unexpected = || DomainError::UnexpectedResponse {
            command: command.raw.clone(),
            response: text.clone(),
        };

        // Several ECUs may answer; the first line wins
        let first = lines.first().ok_or_else(unexpected)?;
        let bytes = decode_hex(first).ok_or_else(unexpected)?;

        let header_len = if pid.is_some() { 2 } else { 1 };
        if bytes.len() < header_len || bytes[0] != mode.wrapping_add(RESPONSE_MODE_OFFSET) {
            return Err(unexpected());
        }
        if let Some(pid) = pid {
            if bytes[1] != pid {
                return Err(unexpected());
            }
        }

        let data = bytes[header_len..].to_vec();
        let (value, unit) = match pid {
            Some(pid) if mode == MODE_CURRENT_DATA => match decode_value(pid, &data) {
                Some(Ok(decoded)) => decoded,
                Some(Err(())) => return Err(unexpected()),
                None => (None, None),
            },
            _ => (None, None),
        };

        Ok(Self {
            raw: text,
            data,
            value,
            unit: unit.map(str::to_string),
        })
    }

    /// Human readable value, falling back to the raw text
    pub fn formatted(&self) -> String {
        match (self.value, &self.unit) {
            (Some(value), Some(unit)) => format!("{} {}", value, unit),
            (Some(value), None) => value.to_string(),
            _ => self.raw.clone(),
        }
    }
}

type Decoded = (Option<f64>, Option<&'static str>);

/// Decode a known mode 01 PID. `None` for PIDs without a formula,
/// `Some(Err(()))` when the payload is too short.
fn decode_value(code: u8, data: &[u8]) -> Option<std::result::Result<Decoded, ()>> {
    let need = |n: usize| if data.len() < n { Err(()) } else { Ok(()) };
    let decoded = match code {
        pid::ENGINE_RPM => need(2).map(|_| {
            let raw = u16::from(data[0]) * 256 + u16::from(data[1]);
            (Some(f64::from(raw) / 4.0), Some("rpm"))
        }),
        pid::VEHICLE_SPEED => need(1).map(|_| (Some(f64::from(data[0])), Some("km/h"))),
        pid::COOLANT_TEMPERATURE | pid::INTAKE_AIR_TEMPERATURE | pid::AMBIENT_AIR_TEMPERATURE => {
            need(1).map(|_| (Some(f64::from(data[0]) - 40.0), Some("C")))
        }
        pid::ENGINE_LOAD | pid::THROTTLE_POSITION => need(1).map(|_| {
            let percent = f64::from(data[0]) * 100.0 / 255.0;
            (Some((percent * 10.0).round() / 10.0), Some("%"))
        }),
        _ => return None,
    };
    Some(decoded)
}

/// Split the adapter output into meaningful lines (no prompt, echo or status)
fn response_lines(command: &ObdCommand, raw: &str) -> Vec<String> {
    let echo = command.raw.replace(' ', "");
    raw.split(['\r', '\n', '>'])
        .map(|line| line.replace("SEARCHING...", "").trim().to_ascii_uppercase())
        .filter(|line| !line.is_empty())
        .filter(|line| line.replace(' ', "") != echo)
        .filter(|line| !(line.starts_with("BUS INIT") && !line.contains("ERROR")))
        .collect()
}

fn adapter_error(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .find(|line| {
            line.as_str() == "?"
                || (line.starts_with("BUS INIT") && line.contains("ERROR"))
                || ADAPTER_ERRORS.iter().any(|marker| line.contains(marker))
        })
        .cloned()
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() || compact.len() % 2 != 0 {
        return None;
    }
    (0..compact.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(compact.get(i..i + 2)?, 16).ok())
        .collect()
}
