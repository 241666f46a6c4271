//! # Operator Console
//!
//! Line-oriented command parsing and the status report printed by the
//! `status` command. Commands are case-insensitive and whitespace-trimmed.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::link::ConnectionState;

/// Operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Enable,
    Disable,
    Scan,
    Disconnect,
}

/// Input that did not match any command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "help" | "h" => Ok(Command::Help),
            "status" | "s" => Ok(Command::Status),
            "enable" | "en" => Ok(Command::Enable),
            "disable" | "dis" => Ok(Command::Disable),
            "scan" => Ok(Command::Scan),
            "disconnect" | "disc" => Ok(Command::Disconnect),
            _ => Err(UnknownCommand(trimmed.to_string())),
        }
    }
}

/// Parse one console line; blank lines yield `None`
pub fn parse_line(line: &str) -> Option<Result<Command, UnknownCommand>> {
    if line.trim().is_empty() {
        return None;
    }
    Some(line.parse())
}

pub const HELP_TEXT: &str = "\
Available commands:
  help, h        - Show this help
  status, s      - Show connection status and data quality
  enable, en     - Enable power measurement notifications
  disable, dis   - Disable power measurement notifications
  scan           - Start scanning for the power meter
  disconnect, disc - Disconnect from the power meter";

/// Snapshot printed by the `status` command
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: ConnectionState,
    pub peer: Option<String>,
    pub handle: Option<u16>,
    pub notifications_enabled: bool,
    pub valid_count: u32,
    pub invalid_count: u32,
    pub quality_good: bool,
    pub last_valid_age_ms: Option<u32>,
    pub power: u16,
    pub cadence: u16,
    pub source: &'static str,
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connected = matches!(
            self.state,
            ConnectionState::Discovering | ConnectionState::Subscribing | ConnectionState::Streaming
        );

        writeln!(f, "=== Power Meter Status ===")?;
        writeln!(f, "State:         {}", self.state)?;
        writeln!(f, "Connected:     {}", yes_no(connected))?;
        writeln!(f, "Scanning:      {}", yes_no(self.state == ConnectionState::Scanning))?;
        writeln!(f, "Notifications: {}", if self.notifications_enabled { "ENABLED" } else { "DISABLED" })?;
        if let Some(peer) = &self.peer {
            writeln!(f, "Device:        {}", peer)?;
        }
        if let Some(handle) = self.handle {
            writeln!(f, "Handle:        {}", handle)?;
        }
        writeln!(f, "Valid packets: {}", self.valid_count)?;
        writeln!(f, "Invalid:       {}", self.invalid_count)?;
        writeln!(f, "Data quality:  {}", if self.quality_good { "GOOD" } else { "POOR" })?;
        match self.last_valid_age_ms {
            Some(age) => writeln!(f, "Last valid:    {}ms ago", age)?,
            None => writeln!(f, "Last valid:    never")?,
        }
        writeln!(f, "Power:         {}W", self.power)?;
        write!(f, "Cadence:       {}RPM ({})", self.cadence, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_and_aliases() {
        let cases = [
            ("help", Command::Help),
            ("h", Command::Help),
            ("status", Command::Status),
            ("s", Command::Status),
            ("enable", Command::Enable),
            ("en", Command::Enable),
            ("disable", Command::Disable),
            ("dis", Command::Disable),
            ("scan", Command::Scan),
            ("disconnect", Command::Disconnect),
            ("disc", Command::Disconnect),
        ];

        for (input, expected) in cases {
            assert_eq!(input.parse::<Command>(), Ok(expected), "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        assert_eq!("  STATUS \r\n".parse::<Command>(), Ok(Command::Status));
        assert_eq!("Disc".parse::<Command>(), Ok(Command::Disconnect));
    }

    #[test]
    fn test_unknown_command() {
        let err = " reboot ".parse::<Command>().unwrap_err();
        assert_eq!(err, UnknownCommand("reboot".to_string()));
        assert_eq!(err.to_string(), "Unknown command: reboot");
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("scan"), Some(Ok(Command::Scan)));
    }

    #[test]
    fn test_status_report_display() {
        let report = StatusReport {
            state: ConnectionState::Streaming,
            peer: Some("E6:28:10:BF:71:3C".to_string()),
            handle: Some(1),
            notifications_enabled: true,
            valid_count: 42,
            invalid_count: 1,
            quality_good: true,
            last_valid_age_ms: Some(120),
            power: 185,
            cadence: 88,
            source: "REAL",
        };

        let text = report.to_string();
        assert!(text.contains("Connected:     YES"));
        assert!(text.contains("Notifications: ENABLED"));
        assert!(text.contains("Handle:        1"));
        assert!(text.contains("Last valid:    120ms ago"));
        assert!(text.ends_with("Cadence:       88RPM (REAL)"));
    }
}
