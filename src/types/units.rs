//! Unit Conversion Utilities
//!
//! Helpers for TRX/SUN conversions and formatting.

/// SUN per TRX
pub const SUN_PER_TRX: u64 = 1_000_000;

/// Convert SUN to a TRX decimal string without trailing zeros
/// e.g., 990 -> "0.00099", 2_500_000 -> "2.5"
pub fn sun_to_trx_string(sun: u64) -> String {
    let whole = sun / SUN_PER_TRX;
    let frac = sun % SUN_PER_TRX;

    if frac == 0 {
        return whole.to_string();
    }

    let frac = format!("{:06}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Convert SUN to human-readable string
/// e.g., 1500000 -> "1,500,000 SUN (1.5 TRX)"
pub fn sun_to_display(sun: u64) -> String {
    format!("{} SUN ({} TRX)", format_with_commas(sun), sun_to_trx_string(sun))
}

/// Parse a TRX amount ("1.5") into SUN; more than 6 decimals is rejected
pub fn parse_trx(s: &str) -> Option<u64> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    if frac.len() > 6 || (whole.is_empty() && frac.is_empty()) {
        return None;
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<6}", frac).parse().ok()?
    };

    whole.checked_mul(SUN_PER_TRX)?.checked_add(frac)
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
