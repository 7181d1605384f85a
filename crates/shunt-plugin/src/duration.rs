//! Human-readable durations for plugin configuration ("2s", "24h", "500ms").

use std::time::Duration;

/// Parses a duration string: an integer followed by `ms`, `s`, `m`, `h` or
/// `d`. Concatenated terms like "1m30s" are accepted.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{}' is missing a unit", s))?;
        if digits_end == 0 {
            return Err(format!("invalid duration '{}'", s));
        }

        let value: u64 = rest[..digits_end]
            .parse()
            .map_err(|_| format!("invalid duration '{}'", s))?;
        let unit_end = digits_end
            + rest[digits_end..]
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(rest.len() - digits_end);

        let term = match &rest[digits_end..unit_end] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86_400),
            unit => return Err(format!("unknown duration unit '{}'", unit)),
        };
        total += term;
        rest = &rest[unit_end..];
    }

    Ok(total)
}

/// Formats a duration the way the config writes them.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if d.subsec_millis() != 0 {
        format!("{}ms", d.as_millis())
    } else if secs % 3600 == 0 && secs != 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 && secs != 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// serde adapter for `Duration` fields: `#[serde(with = "duration")]`.
pub mod serde_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_units() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5d").unwrap(), Duration::from_secs(432_000));
    }

    #[test]
    fn parses_concatenated_terms() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("ten seconds").is_err());
    }

    #[test]
    fn formats_round_trip() {
        for s in ["2s", "30s", "10m", "24h", "500ms"] {
            let d = parse_duration(s).unwrap();
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }
}
