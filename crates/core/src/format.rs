const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Byte counts at or above this value use the GB branch.
pub const GB_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Formats a byte count as `"<value> MB"` or `"<value> GB"` with two decimals
/// and 1024-based units. Callers parse this string back with [`parse_size`],
/// so the shape must not change.
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB_THRESHOLD {
        format!("{:.2} GB", bytes as f64 / GIB)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB)
    }
}

/// Inverse of [`format_size`], accurate to the two-decimal rounding.
pub fn parse_size(text: &str) -> Option<u64> {
    let (value, unit) = text.trim().split_once(' ')?;
    if value.is_empty() || !value.chars().all(|ch| ch.is_ascii_digit() || ch == '.') {
        return None;
    }
    let value: f64 = value.parse().ok()?;
    let multiplier = match unit {
        "MB" => MIB,
        "GB" => GIB,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

/// Subtotal of already formatted sizes, re-formatted. Strings that do not
/// parse count as zero.
pub fn sum_formatted<'a, I>(sizes: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let total = sizes
        .into_iter()
        .filter_map(parse_size)
        .fold(0_u64, |acc, bytes| acc.saturating_add(bytes));
    format_size(total)
}

#[cfg(test)]
mod tests {
    use super::{format_size, parse_size, sum_formatted, GB_THRESHOLD};

    #[test]
    fn formats_megabytes_with_two_decimals() {
        assert_eq!(format_size(0), "0.00 MB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(1536 * 1024), "1.50 MB");
        assert_eq!(format_size(1000), "0.00 MB");
    }

    #[test]
    fn gigabyte_boundary() {
        assert_eq!(format_size(GB_THRESHOLD), "1.00 GB");
        assert_eq!(format_size(GB_THRESHOLD - 1), "1024.00 MB");
        assert_eq!(format_size(GB_THRESHOLD * 5 / 2), "2.50 GB");
    }

    #[test]
    fn parse_round_trip_within_rounding() {
        for bytes in [0_u64, 1, 123_456, 52_428_800, GB_THRESHOLD - 1, GB_THRESHOLD, 7_654_321_987] {
            let formatted = format_size(bytes);
            let parsed = parse_size(&formatted).expect("formatted size parses");
            let tolerance = if bytes >= GB_THRESHOLD {
                GB_THRESHOLD / 100
            } else {
                1024 * 1024 / 100
            };
            assert!(
                parsed.abs_diff(bytes) <= tolerance,
                "{bytes} -> {formatted} -> {parsed}"
            );
        }
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert_eq!(parse_size("12 KB"), None);
        assert_eq!(parse_size("12MB"), None);
        assert_eq!(parse_size("-1.00 MB"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn sums_selected_subset() {
        assert_eq!(sum_formatted(["512.00 MB", "512.00 MB"]), "1.00 GB");
        assert_eq!(sum_formatted(["1.50 MB", "garbage", "0.50 MB"]), "2.00 MB");
        assert_eq!(sum_formatted(Vec::<&str>::new()), "0.00 MB");
    }
}
