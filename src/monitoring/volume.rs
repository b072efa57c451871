/// Convert a human-readable share volume ("1.2M", "500K", "12,345") into shares.
///
/// Returns `None` for empty input or anything that is not a number once the
/// separators and the optional `K`/`M` suffix are removed.
pub fn parse_volume(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    let value = number.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    Some(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixed_volumes() {
        assert_eq!(parse_volume("1.2M"), Some(1_200_000.0));
        assert_eq!(parse_volume("500K"), Some(500_000.0));
        assert_eq!(parse_volume("2.5m"), Some(2_500_000.0));
        assert_eq!(parse_volume("75k"), Some(75_000.0));
    }

    #[test]
    fn test_parse_bare_numbers_and_separators() {
        assert_eq!(parse_volume("12345"), Some(12_345.0));
        assert_eq!(parse_volume("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_volume(" 3.1 M "), Some(3_100_000.0));
    }

    #[test]
    fn test_unparseable_volumes() {
        assert_eq!(parse_volume(""), None);
        assert_eq!(parse_volume("   "), None);
        assert_eq!(parse_volume("abc"), None);
        assert_eq!(parse_volume("M"), None);
        assert_eq!(parse_volume("1.2B"), None);
        assert_eq!(parse_volume("NaN"), None);
    }
}
