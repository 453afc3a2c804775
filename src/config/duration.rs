//! Durations as written in `settings:`: an unsigned integer with an optional
//! unit suffix. A bare number is seconds.

use std::time::Duration;

/// Suffix and its length in milliseconds. `ms` must be tried before `m` and `s`.
const UNITS: [(&str, u64); 4] = [("ms", 1), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)];

/// Parse `"500ms"`, `"10s"`, `"5m"`, `"1h"` or `"30"`.
///
/// ```
/// use mcp_manager::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("5m"), Some(Duration::from_secs(300)));
/// assert_eq!(parse_duration_string("30"), Some(Duration::from_secs(30)));
/// assert_eq!(parse_duration_string("soon"), None);
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, scale) = UNITS
        .iter()
        .find_map(|(suffix, scale)| s.strip_suffix(suffix).map(|d| (d, *scale)))
        .unwrap_or((s, 1_000));

    // u64::parse accepts a leading '+'; settings never do.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<u64>()
        .ok()?
        .checked_mul(scale)
        .map(Duration::from_millis)
}

/// Shortest string `parse_duration_string` reads back as `d` (to the millisecond).
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }
    UNITS[1..]
        .iter()
        .find(|(_, scale)| ms % u128::from(*scale) == 0)
        .map(|(suffix, scale)| format!("{}{}", ms / u128::from(*scale), suffix))
        .unwrap_or_else(|| format!("{}ms", ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes() {
        let cases = [
            ("250ms", Duration::from_millis(250)),
            ("10s", Duration::from_secs(10)),
            ("5m", Duration::from_secs(300)),
            ("2h", Duration::from_secs(7200)),
            ("45", Duration::from_secs(45)),
            (" 0s ", Duration::ZERO),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration_string(input), Some(expected), "{:?}", input);
        }
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "ms", "abc", "5x", "-5s", "+5s", "1.5s", "5 s"] {
            assert_eq!(parse_duration_string(input), None, "{:?}", input);
        }
    }

    #[test]
    fn overflow_is_rejected() {
        assert_eq!(parse_duration_string(&format!("{}h", u64::MAX)), None);
    }

    #[test]
    fn formats_with_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
