use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use std::borrow::Cow;

use crate::app::settings::QueryParserMode;

/// Decode one query component: `+` is a space and percent-escapes are
/// resolved, falling back to lossy UTF-8 for undecodable bytes.
///
fn decode(input: &str) -> String {
    if input.contains('+') {
        let replaced = input.replace('+', " ");
        percent_decode_str(&replaced).decode_utf8_lossy().into_owned()
    } else {
        percent_decode_str(input).decode_utf8_lossy().into_owned()
    }
}

/// An iterator over the raw `name=value` pairs of a query string. Pairs
/// without a `=` yield an empty value, matching the common form-encoding
/// behavior. Empty pairs produced by doubled `&` are skipped.
///
pub(crate) struct Pairs<'a> {
    input: &'a str,
}

impl<'a> Pairs<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.strip_prefix('?').unwrap_or(input),
        }
    }
}

impl<'a> Iterator for Pairs<'a> {
    type Item = (Cow<'a, str>, Cow<'a, str>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.input.is_empty() {
                return None;
            }

            let (pair, rest) = match self.input.split_once('&') {
                Some((pair, rest)) => (pair, rest),
                None => (self.input, ""),
            };

            self.input = rest;

            if pair.is_empty() {
                continue;
            }

            return Some(match pair.split_once('=') {
                Some((name, value)) => (Cow::Borrowed(name), Cow::Borrowed(value)),
                None => (Cow::Borrowed(pair), Cow::Borrowed("")),
            });
        }
    }
}

/// One step of a bracketed key path such as `a[b][0][]`.
///
enum Step {
    Key(String),
    Index(usize),
    Push,
}

/// Split a decoded key into its root and bracketed steps. Keys with
/// unbalanced brackets are treated as flat.
///
fn steps(key: &str) -> (String, Vec<Step>) {
    let Some(open) = key.find('[') else {
        return (key.to_owned(), Vec::new());
    };

    let root = key[..open].to_owned();
    let mut rest = &key[open..];
    let mut steps = Vec::new();

    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            // Unbalanced. Fall back to the whole key as a flat name.
            return (key.to_owned(), Vec::new());
        };

        let inner = &stripped[..close];

        steps.push(if inner.is_empty() {
            Step::Push
        } else if let Ok(index) = inner.parse::<usize>() {
            Step::Index(index)
        } else {
            Step::Key(inner.to_owned())
        });

        rest = &stripped[close + 1..];
    }

    if !rest.is_empty() {
        return (key.to_owned(), Vec::new());
    }

    (root, steps)
}

/// Assign `value` at the end of `path`, materializing objects and arrays
/// along the way. Numeric indices allocate arrays padded with null.
///
fn assign(target: &mut Value, path: &[Step], value: Value) {
    let Some(step) = path.first() else {
        *target = merge_scalar(target.take(), value);
        return;
    };

    match step {
        Step::Key(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }

            let map = target.as_object_mut().unwrap();
            let slot = map.entry(key.clone()).or_insert(Value::Null);

            assign(slot, &path[1..], value);
        }

        Step::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }

            let array = target.as_array_mut().unwrap();

            while array.len() <= *index {
                array.push(Value::Null);
            }

            assign(&mut array[*index], &path[1..], value);
        }

        Step::Push => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }

            let array = target.as_array_mut().unwrap();

            array.push(Value::Null);

            let last = array.len() - 1;
            assign(&mut array[last], &path[1..], value);
        }
    }
}

/// Repeated plain keys collect into an array rather than overwriting.
///
fn merge_scalar(existing: Value, incoming: Value) -> Value {
    match existing {
        Value::Null => incoming,
        Value::Array(mut items) => {
            items.push(incoming);
            Value::Array(items)
        }
        previous => Value::Array(vec![previous, incoming]),
    }
}

/// Parse a query string (or url-encoded form payload) according to the
/// provided mode.
///
pub fn parse(input: &str, mode: QueryParserMode) -> Map<String, Value> {
    match mode {
        QueryParserMode::Disabled => Map::new(),
        QueryParserMode::Simple => parse_simple(input),
        QueryParserMode::Extended => parse_extended(input),
    }
}

/// Flat `name=value` pairs. Repeated names collect into an array in the
/// order they appear.
///
pub fn parse_simple(input: &str) -> Map<String, Value> {
    let mut output = Map::new();

    for (name, value) in Pairs::new(input) {
        let name = decode(&name);
        let value = Value::String(decode(&value));

        match output.remove(&name) {
            None => {
                output.insert(name, value);
            }
            Some(existing) => {
                output.insert(name, merge_scalar(existing, value));
            }
        }
    }

    output
}

/// Bracketed keys become nested objects and arrays: `a[b]=1&a[c][d]=2`
/// produces `{"a":{"b":"1","c":{"d":"2"}}}`.
///
pub fn parse_extended(input: &str) -> Map<String, Value> {
    let mut root = Value::Object(Map::new());

    for (name, value) in Pairs::new(input) {
        let name = decode(&name);
        let value = Value::String(decode(&value));
        let (key, path) = steps(&name);

        let map = root.as_object_mut().unwrap();
        let slot = map.entry(key).or_insert(Value::Null);

        assign(slot, &path, value);
    }

    match root {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_extended, parse_simple};
    use serde_json::json;

    #[test]
    fn simple_pairs() {
        let query = parse_simple("query=books&category=fiction&sort=asc");

        assert_eq!(query["query"], json!("books"));
        assert_eq!(query["category"], json!("fiction"));
        assert_eq!(query["sort"], json!("asc"));
    }

    #[test]
    fn repeated_names_preserve_order() {
        let query = parse_simple("tag=a&tag=b&tag=c");

        assert_eq!(query["tag"], json!(["a", "b", "c"]));
    }

    #[test]
    fn decodes_percent_escapes_and_plus() {
        let query = parse_simple("q=hello%20world&title=a+b");

        assert_eq!(query["q"], json!("hello world"));
        assert_eq!(query["title"], json!("a b"));
    }

    #[test]
    fn name_without_value_is_empty() {
        let query = parse_simple("flag&q=1");

        assert_eq!(query["flag"], json!(""));
        assert_eq!(query["q"], json!("1"));
    }

    #[test]
    fn doubled_ampersands_are_skipped() {
        let query = parse_simple("a=1&&b=2&");

        assert_eq!(query.len(), 2);
        assert_eq!(query["a"], json!("1"));
        assert_eq!(query["b"], json!("2"));
    }

    #[test]
    fn extended_brackets_nest() {
        let query = parse_extended("a[b]=1&a[c][d]=2");

        assert_eq!(query["a"], json!({"b": "1", "c": {"d": "2"}}));
    }

    #[test]
    fn extended_push_allocates_arrays() {
        let query = parse_extended("items[]=book&items[]=pen");

        assert_eq!(query["items"], json!(["book", "pen"]));
    }

    #[test]
    fn extended_numeric_indices_pad_with_null() {
        let query = parse_extended("a[2]=x");

        assert_eq!(query["a"], json!([null, null, "x"]));
    }

    #[test]
    fn unbalanced_brackets_fall_back_to_flat_keys() {
        let query = parse_extended("a[b=1");

        assert_eq!(query["a[b"], json!("1"));
    }

    #[test]
    fn simple_mode_keeps_brackets_flat() {
        let query = parse_simple("a[b]=1");

        assert_eq!(query["a[b]"], json!("1"));
    }
}
