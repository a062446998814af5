//! Rule modes shared by configuration validation and filter compilation.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT: &str = "default";
pub const ON: &str = "on";
pub const OFF: &str = "off";
pub const WHITELIST: &str = "whitelist";
pub const BLACKLIST: &str = "blacklist";

/// A mode string that is not one of the accepted values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode \"{0}\", expected one of: on, off, whitelist, blacklist")]
pub struct ModeError(pub String);

/// Identity admission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    On,
    Off,
    Whitelist,
    Blacklist,
}

impl IdMode {
    /// Parse a bot-app level mode. `Ok(None)` means "inherit the server default".
    pub fn parse_inheritable(s: &str) -> Result<Option<Self>, ModeError> {
        match s {
            "" | DEFAULT => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl FromStr for IdMode {
    type Err = ModeError;

    /// Empty means "on".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | ON => Ok(IdMode::On),
            OFF => Ok(IdMode::Off),
            WHITELIST => Ok(IdMode::Whitelist),
            BLACKLIST => Ok(IdMode::Blacklist),
            other => Err(ModeError(other.to_string())),
        }
    }
}

impl fmt::Display for IdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdMode::On => ON,
            IdMode::Off => OFF,
            IdMode::Whitelist => WHITELIST,
            IdMode::Blacklist => BLACKLIST,
        })
    }
}

/// Content admission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    /// Content is not inspected.
    On,
    /// Every message of the scope is rejected.
    Off,
    Whitelist,
    Blacklist,
}

impl FromStr for ContentMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | ON => Ok(ContentMode::On),
            OFF => Ok(ContentMode::Off),
            WHITELIST => Ok(ContentMode::Whitelist),
            BLACKLIST => Ok(ContentMode::Blacklist),
            other => Err(ModeError(other.to_string())),
        }
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentMode::On => ON,
            ContentMode::Off => OFF,
            ContentMode::Whitelist => WHITELIST,
            ContentMode::Blacklist => BLACKLIST,
        })
    }
}
