//! Run mode selection

use std::fmt;
use std::str::FromStr;

/// What the binary does after start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Periodic timer passes until interrupted
    #[default]
    Scheduler,
    /// One fan-out through an in-process queue, then exit
    Queue,
}

impl Mode {
    /// First positional argument, then `TIDEMARK_MODE`, then the default.
    ///
    /// # Errors
    /// Returns a message naming the unknown mode.
    pub fn resolve(arg: Option<String>, env: Option<String>) -> Result<Self, String> {
        arg.or(env).map_or(Ok(Self::default()), |raw| raw.parse())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduler" | "schedule" => Ok(Self::Scheduler),
            "queue" => Ok(Self::Queue),
            other => Err(format!("unknown mode '{other}' (expected 'scheduler' or 'queue')")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduler => f.write_str("scheduler"),
            Self::Queue => f.write_str("queue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_wins_over_environment() {
        let mode = Mode::resolve(Some("queue".into()), Some("scheduler".into())).unwrap();
        assert_eq!(mode, Mode::Queue);
    }

    #[test]
    fn test_defaults_to_scheduler() {
        assert_eq!(Mode::resolve(None, None).unwrap(), Mode::Scheduler);
        assert_eq!(Mode::resolve(None, Some(" Queue ".into())).unwrap(), Mode::Queue);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = Mode::resolve(Some("batch".into()), None).unwrap_err();
        assert!(err.contains("batch"));
    }
}
