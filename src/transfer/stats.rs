//! Transfer summary line.

use std::time::Duration;

fn trim_fraction(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

/// Formats a float with three significant digits, switching to exponent
/// notation for very large or small values (printf `%.3g`).
pub fn format_significant(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let scientific = format!("{:.2e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..3).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (2 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value))
    }
}

/// `N bytes <direction> in S seconds (R unit/s)`
pub fn throughput_summary(direction: &str, bytes: u64, elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    let rate = bytes as f64 / if seconds == 0.0 { 1.0 } else { seconds };

    let (scaled, unit) = if rate > 1_048_576.0 {
        (rate / 1_048_576.0, "Mbytes/s")
    } else if rate > 1024.0 {
        (rate / 1024.0, "kbytes/s")
    } else {
        (rate, "bytes/s")
    };

    format!(
        "{} bytes {} in {} seconds ({} {})",
        bytes,
        direction,
        format_significant(seconds),
        format_significant(scaled),
        unit
    )
}
