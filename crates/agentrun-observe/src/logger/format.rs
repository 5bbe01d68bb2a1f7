use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::logger::error::LoggerError;

/// Output encoding of the controller logs.
///
/// `Journald` parses everywhere; [`logger_init`](crate::logger_init) rejects it when the
/// platform or build lacks support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerFormat {
    #[default]
    Text,
    Json,
    #[serde(alias = "journal")]
    Journald,
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const NAMES: [(&str, LoggerFormat); 4] = [
            ("text", LoggerFormat::Text),
            ("json", LoggerFormat::Json),
            ("journald", LoggerFormat::Journald),
            ("journal", LoggerFormat::Journald),
        ];
        let wanted = s.trim();
        NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|&(_, format)| format)
            .ok_or_else(|| LoggerError::InvalidFormat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats_case_insensitively() {
        assert_eq!("text".parse::<LoggerFormat>().unwrap(), LoggerFormat::Text);
        assert_eq!(" JSON ".parse::<LoggerFormat>().unwrap(), LoggerFormat::Json);
        assert_eq!("journal".parse::<LoggerFormat>().unwrap(), LoggerFormat::Journald);
    }

    #[test]
    fn rejects_unknown_format() {
        let err = "yaml".parse::<LoggerFormat>().unwrap_err();
        assert!(matches!(err, LoggerError::InvalidFormat(s) if s == "yaml"));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&LoggerFormat::Json).unwrap();
        assert_eq!(json, r#""json""#);
        let back: LoggerFormat = serde_json::from_str(r#""journal""#).unwrap();
        assert_eq!(back, LoggerFormat::Journald);
    }
}
