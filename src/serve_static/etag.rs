use std::time::{SystemTime, UNIX_EPOCH};

/// Generate an entity tag from a file's modification time and size,
/// formatted as `"<hex-mtime>-<hex-size>"`. This pairs cheap derivation
/// with good-enough change detection, the approach common to static file
/// servers.
///
pub(crate) fn generate(modified: SystemTime, size: u64, weak: bool) -> Option<String> {
    let modified = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    let tag = format!("\"{:x}-{:x}\"", modified, size);

    Some(if weak { format!("W/{}", tag) } else { tag })
}

/// Weak comparison of an `If-None-Match` header against an entity tag.
///
pub(crate) fn matches(header: &str, etag: &str) -> bool {
    let normalize = |tag: &str| tag.trim().trim_start_matches("W/").to_owned();
    let expected = normalize(etag);

    header
        .split(',')
        .any(|candidate| candidate.trim() == "*" || normalize(candidate) == expected)
}

#[cfg(test)]
mod tests {
    use super::{generate, matches};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn format_is_hex_mtime_dash_hex_size() {
        let modified = UNIX_EPOCH + Duration::from_secs(0x5f5e100);
        let etag = generate(modified, 5, true).unwrap();

        assert_eq!(etag, "W/\"5f5e100-5\"");

        let strong = generate(modified, 5, false).unwrap();
        assert_eq!(strong, "\"5f5e100-5\"");
    }

    #[test]
    fn comparison_ignores_weakness_and_lists() {
        assert!(matches("W/\"a-1\"", "\"a-1\""));
        assert!(matches("\"x-2\", \"a-1\"", "W/\"a-1\""));
        assert!(matches("*", "\"a-1\""));
        assert!(!matches("\"b-1\"", "\"a-1\""));
    }
}
