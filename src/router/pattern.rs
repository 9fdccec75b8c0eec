use percent_encoding::percent_decode_str;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::request::Params;

/// A compiled path pattern.
///
/// Patterns are compiled once at registration time and matched against the
/// decoded-on-demand path of every request. The grammar is deliberately
/// small: literal segments, named parameters (`:name`), optional named
/// parameters (`:name?`), and the greedy wildcard (`*`).
///
/// A pattern compiled with `end == true` must consume the entire path
/// (routes). With `end == false` it matches a prefix of the path ending at
/// a segment boundary and reports how many bytes it consumed (middleware).
///
#[derive(Debug)]
pub struct PathPattern {
    source: String,
    tokens: Vec<Token>,
    keys: Vec<Key>,
    end: bool,
    strict: bool,
    sensitive: bool,
    trailing_slash: bool,
}

/// A key descriptor for one capturing token, in capture order.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    pub name: Arc<str>,
    pub optional: bool,
}

/// Options applied when compiling a pattern. The owning router supplies
/// them from its own flags.
///
#[derive(Clone, Copy, Debug)]
pub struct PatternOptions {
    pub end: bool,
    pub strict: bool,
    pub sensitive: bool,
}

/// A successful match: the captured parameters and the byte length of the
/// path prefix the pattern consumed. The prefix is only meaningful for
/// patterns compiled with `end == false`.
///
#[derive(Debug)]
pub struct PatternMatch {
    pub params: Params,
    pub matched: usize,
}

/// The error returned when a pattern source does not conform to the
/// pattern grammar.
///
#[derive(Debug)]
pub struct InvalidPattern {
    source: String,
    reason: String,
}

#[derive(Debug, PartialEq)]
enum Token {
    /// One path segment matched by value.
    Literal(String),

    /// One non-empty path segment captured under `keys[key]`.
    Param { key: usize, optional: bool },

    /// Zero or more path segments captured under `keys[key]`.
    Wildcard { key: usize },
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            end: true,
            strict: false,
            sensitive: false,
        }
    }
}

impl Display for InvalidPattern {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "invalid path pattern {:?}: {}", self.source, self.reason)
    }
}

impl StdError for InvalidPattern {}

impl InvalidPattern {
    fn new(source: &str, reason: impl Into<String>) -> Self {
        Self {
            source: source.to_owned(),
            reason: reason.into(),
        }
    }
}

fn is_ident(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(char) if char.is_ascii_alphabetic() || char == '_' => {}
        _ => return false,
    }

    chars.all(|char| char.is_ascii_alphanumeric() || char == '_')
}

/// Decode a captured path segment, falling back to the raw text when the
/// percent-encoding does not decode to valid UTF-8.
///
fn decode(segment: &str) -> String {
    match percent_decode_str(segment).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_owned(),
    }
}

/// Split a path into its segments together with the byte range each one
/// occupies. Empty segments produced by doubled slashes are preserved so
/// they can fail literal and parameter matches.
///
fn segments(path: &str) -> Vec<(usize, usize)> {
    let mut output = Vec::new();
    let mut start = usize::from(path.starts_with('/'));

    if path.len() <= start {
        return output;
    }

    for (index, byte) in path.bytes().enumerate().skip(start) {
        if byte == b'/' {
            output.push((start, index));
            start = index + 1;
        }
    }

    if start < path.len() {
        output.push((start, path.len()));
    }

    output
}

impl PathPattern {
    /// Compile `source` into a deterministic matcher.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPattern`] when the source does not conform to the
    /// pattern grammar, for example a `:` followed by a non-identifier.
    ///
    pub fn compile(source: &str, options: PatternOptions) -> Result<Self, InvalidPattern> {
        let normalized = if source == "*" { "/*" } else { source };

        if !normalized.starts_with('/') {
            return Err(InvalidPattern::new(source, "must start with '/'"));
        }

        let mut tokens = Vec::new();
        let mut keys = Vec::new();
        let mut wildcards = 0;

        for (start, end) in segments(normalized) {
            let segment = &normalized[start..end];

            match segment.as_bytes().first() {
                Some(b':') => {
                    let rest = &segment[1..];
                    let (name, optional) = match rest.strip_suffix('?') {
                        Some(name) => (name, true),
                        None => (rest, false),
                    };

                    if !is_ident(name) {
                        return Err(InvalidPattern::new(
                            source,
                            format!("':' must be followed by an identifier, found {:?}", rest),
                        ));
                    }

                    tokens.push(Token::Param {
                        key: keys.len(),
                        optional,
                    });
                    keys.push(Key {
                        name: Arc::from(name),
                        optional,
                    });
                }

                Some(b'*') if segment == "*" => {
                    tokens.push(Token::Wildcard { key: keys.len() });
                    keys.push(Key {
                        name: Arc::from(wildcards.to_string()),
                        optional: false,
                    });
                    wildcards += 1;
                }

                _ => {
                    if segment.contains('*') || segment.contains(':') {
                        return Err(InvalidPattern::new(
                            source,
                            "'*' and ':' are only valid at the start of a segment",
                        ));
                    }

                    tokens.push(Token::Literal(segment.to_owned()));
                }
            }
        }

        Ok(Self {
            source: source.to_owned(),
            trailing_slash: normalized.len() > 1 && normalized.ends_with('/'),
            tokens,
            keys,
            end: options.end,
            strict: options.strict,
            sensitive: options.sensitive,
        })
    }

    /// Returns the pattern source as it was written at registration.
    ///
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the ordered key descriptors of the pattern's captures.
    ///
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Match the pattern against a request path.
    ///
    /// Returns the captured parameters and the byte length of the consumed
    /// prefix, or `None` when the path does not match.
    ///
    pub fn matches(&self, path: &str) -> Option<PatternMatch> {
        let segments = segments(path);

        if self.end && self.strict {
            let has_trailing = path.len() > 1 && path.ends_with('/');

            if has_trailing != self.trailing_slash {
                return None;
            }
        }

        let mut captures = vec![None; self.keys.len()];
        let consumed = self.run(&self.tokens, &segments, path, &mut captures)?;

        let mut params = Params::new();

        for (key, capture) in self.keys.iter().zip(captures) {
            params.insert(Arc::clone(&key.name), capture);
        }

        // The consumed prefix ends at the boundary of the last matched
        // segment. A root pattern consumes nothing.
        let matched = if consumed == 0 {
            0
        } else {
            segments[consumed - 1].1
        };

        Some(PatternMatch { params, matched })
    }

    /// Recursively match tokens against segments. Returns the number of
    /// segments consumed. Optional parameters and wildcards backtrack.
    ///
    fn run(
        &self,
        tokens: &[Token],
        segments: &[(usize, usize)],
        path: &str,
        captures: &mut Vec<Option<String>>,
    ) -> Option<usize> {
        let token = match tokens.first() {
            Some(token) => token,
            None => {
                // All tokens consumed. Routes must also exhaust the path.
                return if self.end && !segments.is_empty() {
                    None
                } else {
                    Some(0)
                };
            }
        };

        match token {
            Token::Literal(literal) => {
                let (start, end) = *segments.first()?;
                let segment = &path[start..end];

                let matches = if self.sensitive {
                    literal == segment
                } else {
                    literal.eq_ignore_ascii_case(segment)
                };

                if matches {
                    let consumed = self.run(&tokens[1..], &segments[1..], path, captures)?;
                    Some(consumed + 1)
                } else {
                    None
                }
            }

            Token::Param { key, optional } => {
                if let Some(&(start, end)) = segments.first() {
                    if end > start {
                        captures[*key] = Some(decode(&path[start..end]));

                        if let Some(consumed) =
                            self.run(&tokens[1..], &segments[1..], path, captures)
                        {
                            return Some(consumed + 1);
                        }
                    }
                }

                if *optional {
                    captures[*key] = None;
                    self.run(&tokens[1..], segments, path, captures)
                } else {
                    None
                }
            }

            Token::Wildcard { key } => {
                // Greedy. Try the longest suffix first and back off one
                // segment at a time.
                for take in (0..=segments.len()).rev() {
                    captures[*key] = Some(if take == 0 {
                        String::new()
                    } else {
                        decode(&path[segments[0].0..segments[take - 1].1])
                    });

                    if let Some(consumed) = self.run(&tokens[1..], &segments[take..], path, captures)
                    {
                        return Some(consumed + take);
                    }
                }

                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PathPattern, PatternOptions};

    fn exact(source: &str) -> PathPattern {
        PathPattern::compile(source, PatternOptions::default()).unwrap()
    }

    fn prefix(source: &str) -> PathPattern {
        PathPattern::compile(
            source,
            PatternOptions {
                end: false,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn literal_routes_match_exactly() {
        let pattern = exact("/users/all");

        assert!(pattern.matches("/users/all").is_some());
        assert!(pattern.matches("/users/all/extra").is_none());
        assert!(pattern.matches("/users").is_none());
    }

    #[test]
    fn matching_is_case_insensitive_by_default() {
        let pattern = exact("/Users");

        assert!(pattern.matches("/users").is_some());
        assert!(pattern.matches("/USERS").is_some());

        let sensitive = PathPattern::compile(
            "/Users",
            PatternOptions {
                sensitive: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(sensitive.matches("/users").is_none());
        assert!(sensitive.matches("/Users").is_some());
    }

    #[test]
    fn trailing_slash_is_tolerated_unless_strict() {
        let pattern = exact("/users");
        assert!(pattern.matches("/users/").is_some());

        let strict = PathPattern::compile(
            "/users",
            PatternOptions {
                strict: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(strict.matches("/users").is_some());
        assert!(strict.matches("/users/").is_none());
    }

    #[test]
    fn params_capture_decoded_segments() {
        let pattern = exact("/users/:id");
        let matched = pattern.matches("/users/42").unwrap();

        assert_eq!(matched.params.get("id"), Some("42"));

        let matched = pattern.matches("/users/j%C3%BCrgen").unwrap();
        assert_eq!(matched.params.get("id"), Some("jürgen"));

        // Undecodable captures fall back to the raw segment.
        let matched = pattern.matches("/users/%C3%28").unwrap();
        assert_eq!(matched.params.get("id"), Some("%C3%28"));
    }

    #[test]
    fn params_require_a_non_empty_segment() {
        let pattern = exact("/users/:id");

        assert!(pattern.matches("/users//").is_none());
        assert!(pattern.matches("/users").is_none());
    }

    #[test]
    fn optional_params_may_be_absent() {
        let pattern = exact("/files/:name?");

        let matched = pattern.matches("/files/report.pdf").unwrap();
        assert_eq!(matched.params.get("name"), Some("report.pdf"));

        let matched = pattern.matches("/files").unwrap();
        assert!(matched.params.contains("name"));
        assert_eq!(matched.params.get("name"), None);
    }

    #[test]
    fn consecutive_optionals_bind_left_to_right() {
        let pattern = exact("/archive/:year?/:month?");

        let matched = pattern.matches("/archive/2024/06").unwrap();
        assert_eq!(matched.params.get("year"), Some("2024"));
        assert_eq!(matched.params.get("month"), Some("06"));

        let matched = pattern.matches("/archive/2024").unwrap();
        assert_eq!(matched.params.get("year"), Some("2024"));
        assert_eq!(matched.params.get("month"), None);

        let matched = pattern.matches("/archive").unwrap();
        assert_eq!(matched.params.get("year"), None);
        assert_eq!(matched.params.get("month"), None);
    }

    #[test]
    fn wildcard_captures_the_remaining_path() {
        let pattern = exact("/files/*");
        let matched = pattern.matches("/files/images/logo.png").unwrap();

        assert_eq!(matched.params.get("0"), Some("images/logo.png"));
    }

    #[test]
    fn wildcard_only_source_captures_everything() {
        let pattern = exact("*");
        let matched = pattern.matches("/any/path/at/all").unwrap();

        assert_eq!(matched.params.get("0"), Some("any/path/at/all"));
    }

    #[test]
    fn multiple_wildcards_use_positional_keys() {
        let pattern = exact("/a/*/b/*");
        let matched = pattern.matches("/a/x/y/b/z").unwrap();

        assert_eq!(matched.params.get("0"), Some("x/y"));
        assert_eq!(matched.params.get("1"), Some("z"));
    }

    #[test]
    fn prefix_mode_matches_at_segment_boundaries() {
        let pattern = prefix("/api");

        let matched = pattern.matches("/api/users").unwrap();
        assert_eq!(matched.matched, 4);

        let matched = pattern.matches("/api").unwrap();
        assert_eq!(matched.matched, 4);

        // "/apiary" shares the byte prefix but not a segment boundary.
        assert!(pattern.matches("/apiary").is_none());
    }

    #[test]
    fn root_prefix_matches_everything_and_consumes_nothing() {
        let pattern = prefix("/");

        let matched = pattern.matches("/any/path").unwrap();
        assert_eq!(matched.matched, 0);

        let matched = pattern.matches("/").unwrap();
        assert_eq!(matched.matched, 0);
    }

    #[test]
    fn prefix_mode_with_params_consumes_their_segments() {
        let pattern = prefix("/tenants/:tenant");
        let matched = pattern.matches("/tenants/acme/users/1").unwrap();

        assert_eq!(matched.params.get("tenant"), Some("acme"));
        assert_eq!(matched.matched, "/tenants/acme".len());
    }

    #[test]
    fn rejects_malformed_sources() {
        assert!(PathPattern::compile(":", PatternOptions::default()).is_err());
        assert!(PathPattern::compile("/:", PatternOptions::default()).is_err());
        assert!(PathPattern::compile("/:9id", PatternOptions::default()).is_err());
        assert!(PathPattern::compile("/a*b", PatternOptions::default()).is_err());
        assert!(PathPattern::compile("relative", PatternOptions::default()).is_err());
    }
}
