/// Content negotiation against the request `Accept` header and shorthand
/// content-type matching for `Request::is` and the body parsers.
///
/// Shorthands expand through a small table backed by the MIME registry:
/// `"json"` is `application/json`, `"html"` is `text/html`, and so on.
///
fn expand(shorthand: &str) -> Option<String> {
    if shorthand.contains('/') {
        return Some(shorthand.to_ascii_lowercase());
    }

    match shorthand {
        "json" => Some("application/json".to_owned()),
        "urlencoded" => Some("application/x-www-form-urlencoded".to_owned()),
        "text" => Some("text/plain".to_owned()),
        "html" => Some("text/html".to_owned()),
        "xml" => Some("application/xml".to_owned()),
        "bin" | "binary" => Some("application/octet-stream".to_owned()),
        other => mime_guess::from_ext(other)
            .first()
            .map(|mime| mime.essence_str().to_owned()),
    }
}

/// Strip parameters and normalize a `Content-Type` header value down to
/// `type/subtype`.
///
pub(crate) fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Returns true when the normalized content type matches the provided
/// pattern. Patterns may be a shorthand (`json`), a full type
/// (`application/json`), or contain wildcards (`text/*`, `*/json`,
/// `*/*`). A `+suffix` subtype such as `application/problem+json` matches
/// the `*/json` and `json` patterns.
///
pub fn type_matches(content_type: &str, pattern: &str) -> bool {
    let content_type = essence(content_type);

    let (kind, subtype) = match content_type.split_once('/') {
        Some(parts) => parts,
        None => return false,
    };

    let pattern = match pattern.contains('/') {
        true => pattern.to_ascii_lowercase(),
        false => match expand(pattern) {
            Some(expanded) => expanded,
            None => return false,
        },
    };

    let (want_kind, want_subtype) = match pattern.split_once('/') {
        Some(parts) => parts,
        None => return false,
    };

    let kind_matches = want_kind == "*" || want_kind == kind;
    let subtype_matches = want_subtype == "*"
        || want_subtype == subtype
        || subtype
            .rsplit_once('+')
            .is_some_and(|(_, suffix)| suffix == want_subtype);

    kind_matches && subtype_matches
}

/// One entry of a parsed `Accept` header.
///
#[derive(Debug)]
struct AcceptEntry {
    kind: String,
    subtype: String,
    quality: f32,
}

fn parse_accept(header: &str) -> Vec<AcceptEntry> {
    let mut entries: Vec<AcceptEntry> = header
        .split(',')
        .filter_map(|part| {
            let mut params = part.trim().split(';');
            let range = params.next()?.trim().to_ascii_lowercase();
            let (kind, subtype) = range.split_once('/')?;

            let quality = params
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);

            Some(AcceptEntry {
                kind: kind.to_owned(),
                subtype: subtype.to_owned(),
                quality,
            })
        })
        .collect();

    // Stable by quality so equal weights keep the order the client wrote.
    entries.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

/// Negotiate the provided offers against an `Accept` header. Returns the
/// first offer acceptable to the client, honoring client preference order,
/// or `None` when nothing matches. A missing or empty header accepts the
/// first offer.
///
pub fn negotiate<'a>(header: Option<&str>, offers: &[&'a str]) -> Option<&'a str> {
    let header = match header {
        Some(header) if !header.trim().is_empty() => header,
        _ => return offers.first().copied(),
    };

    for entry in parse_accept(header) {
        if entry.quality <= 0.0 {
            continue;
        }

        for offer in offers {
            let expanded = match expand(offer) {
                Some(expanded) => expanded,
                None => continue,
            };

            let (kind, subtype) = match expanded.split_once('/') {
                Some(parts) => parts,
                None => continue,
            };

            let kind_matches = entry.kind == "*" || entry.kind == kind;
            let subtype_matches = entry.subtype == "*" || entry.subtype == subtype;

            if kind_matches && subtype_matches {
                return Some(offer);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{negotiate, type_matches};

    #[test]
    fn shorthand_patterns() {
        assert!(type_matches("application/json; charset=utf-8", "json"));
        assert!(type_matches("application/x-www-form-urlencoded", "urlencoded"));
        assert!(type_matches("text/plain", "text"));
        assert!(!type_matches("text/html", "json"));
    }

    #[test]
    fn wildcard_patterns() {
        assert!(type_matches("text/html", "text/*"));
        assert!(type_matches("application/json", "*/json"));
        assert!(type_matches("image/png", "*/*"));
        assert!(!type_matches("application/json", "text/*"));
    }

    #[test]
    fn structured_suffixes_match_their_base() {
        assert!(type_matches("application/problem+json", "*/json"));
        assert!(type_matches("application/problem+json", "json"));
    }

    #[test]
    fn negotiation_follows_client_preference() {
        let header = Some("text/html,application/json;q=0.9");

        assert_eq!(negotiate(header, &["json", "html"]), Some("html"));
        assert_eq!(negotiate(header, &["json"]), Some("json"));
    }

    #[test]
    fn negotiation_respects_wildcards_and_exclusions() {
        assert_eq!(negotiate(Some("*/*"), &["json", "html"]), Some("json"));
        assert_eq!(negotiate(Some("text/*"), &["json", "html"]), Some("html"));
        assert_eq!(negotiate(Some("application/json;q=0"), &["json"]), None);
    }

    #[test]
    fn missing_header_accepts_the_first_offer() {
        assert_eq!(negotiate(None, &["html", "json"]), Some("html"));
    }
}
