//! Session configuration.

use std::{fmt, str::FromStr};

/// Verbosity at which time-stamped operator actions are logged.
pub const VERBOSITY_ACTIONS: u8 = 1;

/// Verbosity at which raw protocol traffic is logged.
pub const VERBOSITY_TRAFFIC: u8 = 2;

/// What to do when a fault event reports a time earlier than the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockPolicy {
    /// Abort the session with `SessionError::ClockRegression`
    #[default]
    Strict,
    /// Log a warning, keep the current clock value and dispatch anyway
    Lenient,
}

impl FromStr for ClockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!("unknown clock policy '{other}' (expected strict or lenient)")),
        }
    }
}

impl fmt::Display for ClockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::Lenient => f.write_str("lenient"),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 0: quiet, 1: time-stamped actions, 2: protocol traffic
    pub verbosity: u8,
    /// Handling of simulated time going backwards
    pub clock_policy: ClockPolicy,
}

impl SessionConfig {
    /// Whether time-stamped actions are logged.
    pub fn logs_actions(&self) -> bool {
        self.verbosity >= VERBOSITY_ACTIONS
    }

    /// Whether commands and responses are logged.
    pub fn logs_traffic(&self) -> bool {
        self.verbosity >= VERBOSITY_TRAFFIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels_nest() {
        let quiet = SessionConfig::default();
        assert!(!quiet.logs_actions());
        assert!(!quiet.logs_traffic());

        let traffic = SessionConfig { verbosity: 2, ..Default::default() };
        assert!(traffic.logs_actions());
        assert!(traffic.logs_traffic());
    }

    #[test]
    fn clock_policy_parses() {
        assert_eq!("strict".parse::<ClockPolicy>(), Ok(ClockPolicy::Strict));
        assert_eq!("lenient".parse::<ClockPolicy>(), Ok(ClockPolicy::Lenient));
        assert!("adopt".parse::<ClockPolicy>().is_err());
        assert_eq!(ClockPolicy::default().to_string(), "strict");
    }
}
