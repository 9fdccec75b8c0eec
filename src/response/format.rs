//! Settings-aware response serialization: JSON with configurable
//! indentation and HTML-safe escaping, and the JSONP wrapper.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use super::response::Response;
use crate::error::Error;
use crate::request::Request;

/// Serialize `data` honoring the `json spaces` and `json escape`
/// application settings.
///
fn serialize<T: Serialize>(data: &T, spaces: usize, escape: bool) -> Result<String, Error> {
    let mut output = if spaces == 0 {
        serde_json::to_string(data)?
    } else {
        let indent = vec![b' '; spaces];
        let mut buffer = Vec::new();

        {
            let formatter = PrettyFormatter::with_indent(&indent);
            let mut serializer = Serializer::with_formatter(&mut buffer, formatter);

            data.serialize(&mut serializer)?;
        }

        String::from_utf8(buffer).map_err(Error::internal_server_error)?
    };

    if escape {
        output = output
            .replace('&', "\\u0026")
            .replace('<', "\\u003c")
            .replace('>', "\\u003e");
    }

    Ok(output)
}

/// Respond with a JSON payload serialized per the application settings of
/// the provided request.
///
pub fn json<State, T>(request: &Request<State>, data: &T) -> Result<Response, Error>
where
    T: Serialize,
{
    let (spaces, escape) = {
        let settings = request.app().settings();
        (settings.json_spaces, settings.json_escape)
    };

    let payload = serialize(data, spaces, escape)?;

    Response::build()
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .header(CONTENT_LENGTH, payload.len())
        .body(payload)
}

/// Returns true for callback names that match a conservative identifier
/// alphabet: letters, digits, `_`, `$`, `.`, and brackets.
///
fn valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name.chars().all(|char| {
            char.is_ascii_alphanumeric() || matches!(char, '_' | '$' | '.' | '[' | ']')
        })
}

/// Respond with a JSONP payload when the request carries a callback query
/// parameter (named by the `jsonp callback name` setting) that passes the
/// identifier check; otherwise respond with plain JSON.
///
/// The payload is wrapped as
/// `/**/ typeof NAME === 'function' && NAME(BODY);` and served as
/// `text/javascript`.
///
pub fn jsonp<State, T>(request: &Request<State>, data: &T) -> Result<Response, Error>
where
    T: Serialize,
{
    let (spaces, escape, callback_name) = {
        let settings = request.app().settings();
        (
            settings.json_spaces,
            settings.json_escape,
            settings.jsonp_callback_name.clone(),
        )
    };

    let callback = request
        .query_str(&callback_name)
        .filter(|name| valid_callback(name))
        .map(str::to_owned);

    let callback = match callback {
        Some(callback) => callback,
        None => return json(request, data),
    };

    // U+2028 and U+2029 are valid JSON but terminate JavaScript string
    // literals, so they must be escaped inside a script payload.
    let payload = serialize(data, spaces, escape)?
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029");

    let script = format!(
        "/**/ typeof {callback} === 'function' && {callback}({payload});",
        callback = callback,
        payload = payload,
    );

    Response::build()
        .header(CONTENT_TYPE, "text/javascript; charset=utf-8")
        .header(CONTENT_LENGTH, script.len())
        .body(script)
}

#[cfg(test)]
mod tests {
    use super::{serialize, valid_callback};
    use serde_json::json;

    #[test]
    fn compact_by_default() {
        let output = serialize(&json!({"a": 1, "b": [1, 2]}), 0, false).unwrap();

        assert_eq!(output, r#"{"a":1,"b":[1,2]}"#);
    }

    #[test]
    fn spaces_indent_the_output() {
        let output = serialize(&json!({"a": 1}), 2, false).unwrap();

        assert_eq!(output, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn escape_replaces_html_significant_characters() {
        let output = serialize(&json!({"html": "<b>&</b>"}), 0, true).unwrap();

        assert!(!output.contains('<'));
        assert!(!output.contains('>'));
        assert!(!output.contains('&'));
        assert!(output.contains("\\u003cb\\u003e"));
    }

    #[test]
    fn callback_names_are_conservative() {
        assert!(valid_callback("callback"));
        assert!(valid_callback("window.cb[0]"));
        assert!(!valid_callback(""));
        assert!(!valid_callback("alert(1)"));
        assert!(!valid_callback("a b"));
    }
}
