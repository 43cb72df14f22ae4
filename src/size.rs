//! Human-readable size parsing and formatting, consumed by the CLI binary
//! (`-m`, `-M`, `-x`) and by the text reporter (`-d`). This is an external
//! collaborator per the engine's design, but the binary needs a concrete
//! instance to be runnable.

use crate::error::EngineError;

/// Parses a size like `1.5K`, `4M`, `512` (bytes, no suffix) into a byte
/// count. Suffixes are `K, M, G, T` (case-insensitive, KiB-based). An empty
/// string or an unrecognized suffix is an error.
pub fn parse_human_size(input: &str) -> Result<i64, EngineError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidArgument("empty size".to_string()));
    }

    let (digits, suffix) = match trimmed.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };

    if digits.is_empty() {
        return Err(EngineError::InvalidArgument(format!("bad size: {input}")));
    }

    let value: f64 = digits
        .parse()
        .map_err(|_| EngineError::InvalidArgument(format!("bad size: {input}")))?;

    let multiplier: f64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" => 1.0,
        "K" => 1024.0,
        "M" => 1024.0 * 1024.0,
        "G" => 1024.0 * 1024.0 * 1024.0,
        "T" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        other => {
            return Err(EngineError::InvalidArgument(format!(
                "unknown size suffix: {other}"
            )))
        }
    };

    Ok((value * multiplier) as i64)
}

/// Formats a byte count using the same KiB-based units `parse_human_size`
/// accepts, picking the largest unit that keeps the mantissa >= 1.
pub fn format_human_size(bytes: i64) -> String {
    const UNITS: [(&str, f64); 4] = [
        ("T", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("G", 1024.0 * 1024.0 * 1024.0),
        ("M", 1024.0 * 1024.0),
        ("K", 1024.0),
    ];

    let abs = bytes.unsigned_abs() as f64;
    for (suffix, threshold) in UNITS {
        if abs >= threshold {
            return format!("{:.1}{}", bytes as f64 / threshold, suffix);
        }
    }
    format!("{bytes}B")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_bytes() {
        assert_eq!(parse_human_size("512").unwrap(), 512);
    }

    #[test]
    fn parses_decimal_suffix() {
        assert_eq!(parse_human_size("1.5K").unwrap(), 1536);
    }

    #[test]
    fn parses_case_insensitive() {
        assert_eq!(parse_human_size("2m").unwrap(), 2 * 1024 * 1024);
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_human_size("").is_err());
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(parse_human_size("4Z").is_err());
    }

    #[test]
    fn formats_round_trip_units() {
        assert_eq!(format_human_size(1536), "1.5K");
        assert_eq!(format_human_size(100), "100B");
    }
}
