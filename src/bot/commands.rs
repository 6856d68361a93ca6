// src/bot/commands.rs - Text command recognition for moderation commands

use crate::types::{ModerationError, ModerationResult};

/// A recognized moderation command with its raw argument.
/// Arguments are validated later, after the caller has been authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationCommand {
    /// `/clear [count]`
    Clear { count: Option<String> },
    /// `/mute [minutes]` or `سکوت [minutes]`
    Mute { minutes: Option<String> },
    /// `/unmute` or `رفع سکوت`
    Unmute,
    /// `/unpin` or `حذف پین`
    Unpin,
}

impl ModerationCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ModerationCommand::Clear { .. } => "clear",
            ModerationCommand::Mute { .. } => "mute",
            ModerationCommand::Unmute => "unmute",
            ModerationCommand::Unpin => "unpin",
        }
    }
}

/// Map Persian and Arabic-Indic digits to ASCII
pub fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            other => other,
        })
        .collect()
}

/// Slash command name without an `@botname` suffix
fn command_word(token: &str) -> String {
    token.split('@').next().unwrap_or(token).to_lowercase()
}

/// Recognize a moderation command. Returns `None` for ordinary messages.
///
/// English commands need the leading `/`; the Persian keywords are bare words.
pub fn parse_command(text: &str) -> Option<ModerationCommand> {
    let mut parts = text.split_whitespace();
    let first = parts.next()?;
    let arg = parts.next();

    if let Some(slash_command) = first.strip_prefix('/') {
        return match command_word(slash_command).as_str() {
            "clear" => Some(ModerationCommand::Clear {
                count: arg.map(str::to_string),
            }),
            "mute" => Some(ModerationCommand::Mute {
                minutes: arg.map(str::to_string),
            }),
            "unmute" => Some(ModerationCommand::Unmute),
            "unpin" => Some(ModerationCommand::Unpin),
            _ => None,
        };
    }

    match (first, arg) {
        ("سکوت", arg) => Some(ModerationCommand::Mute {
            minutes: arg.map(str::to_string),
        }),
        ("رفع", Some("سکوت")) => Some(ModerationCommand::Unmute),
        ("حذف", Some("پین")) => Some(ModerationCommand::Unpin),
        _ => None,
    }
}

/// Deletion count argument; missing means `default`.
/// Range checks happen in the deletion executor.
pub fn parse_count(raw: Option<&str>, default: i64) -> ModerationResult<i64> {
    match raw {
        None => Ok(default),
        Some(raw) => normalize_digits(raw)
            .parse::<i64>()
            .map_err(|_| ModerationError::InvalidCount {
                input: raw.to_string(),
            }),
    }
}

/// Mute length argument; missing, zero or negative means indefinite
pub fn parse_minutes(raw: Option<&str>) -> ModerationResult<Option<u64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let minutes = normalize_digits(raw)
        .parse::<i64>()
        .map_err(|_| ModerationError::InvalidDuration {
            input: raw.to_string(),
        })?;
    Ok(u64::try_from(minutes).ok().filter(|m| *m > 0))
}
