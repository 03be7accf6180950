//! Invocation Parser
//!
//! Parses the `name:selector?params` form that references a config source.
//! The query part follows URL query-string conventions: `&`-separated
//! `key[=value]` pairs, plus/percent encoded, with each value typed as an
//! integer, a boolean or a string (first successful parse wins).
//!
//! # Example
//!
//! ```rust
//! use config_resolver_core::invocation::parse_invocation;
//!
//! let inv = parse_invocation("vault:db/password?version=3").unwrap();
//! assert_eq!(inv.name, "vault");
//! assert_eq!(inv.selector, "db/password");
//! assert_eq!(inv.params.unwrap()["version"], 3);
//! ```

use serde_json::{Map, Value};

use crate::error::ParseError;

/// Typed invocation parameters
pub type Params = Map<String, Value>;

/// A parsed config source invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Config source name key, possibly `/`-qualified
    pub name: String,
    /// Source-specific selector
    pub selector: String,
    /// Parameters from the query part, `None` when there is no query
    pub params: Option<Params>,
}

/// Parse `name:selector[?query]`
///
/// Name and selector are trimmed so that the delimited form
/// `${ name: selector }` parses like `name:selector`.
pub fn parse_invocation(invocation: &str) -> Result<Invocation, ParseError> {
    let (name, rest) = invocation
        .split_once(':')
        .ok_or_else(|| ParseError::MissingSelector {
            invocation: invocation.to_string(),
        })?;

    let name = name.trim();
    if name.is_empty() {
        return Err(ParseError::EmptyName {
            invocation: invocation.to_string(),
        });
    }

    let (selector, query) = match rest.split_once('?') {
        Some((selector, query)) => (selector, Some(query)),
        None => (rest, None),
    };

    let params = match query {
        Some(query) if !query.trim().is_empty() => Some(parse_query(query, invocation)?),
        _ => None,
    };

    Ok(Invocation {
        name: name.to_string(),
        selector: selector.trim().to_string(),
        params,
    })
}

fn parse_query(query: &str, invocation: &str) -> Result<Params, ParseError> {
    // Keys keep first-occurrence order while values accumulate.
    let mut collected: Vec<(String, Vec<Value>)> = Vec::new();

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (raw_key, raw_value) = match pair.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (pair, None),
        };

        let key = decode_component(raw_key, raw_key)?;
        if !is_valid_param_name(&key) {
            return Err(ParseError::InvalidParamName {
                key,
                invocation: invocation.to_string(),
            });
        }

        let value = match raw_value {
            None | Some("") => Value::Null,
            Some(raw) => infer_value(decode_component(raw, &key)?),
        };

        match collected.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, values)) => values.push(value),
            None => collected.push((key, vec![value])),
        }
    }

    let mut params = Params::new();
    for (key, mut values) in collected {
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        params.insert(key, value);
    }
    Ok(params)
}

fn decode_component(raw: &str, key: &str) -> Result<String, ParseError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ParseError::InvalidEncoding {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn is_valid_param_name(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Type a decoded parameter value: integer, then boolean, then string
fn infer_value(raw: String) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    match raw.as_str() {
        "t" | "T" | "true" | "TRUE" | "True" => Value::Bool(true),
        "f" | "F" | "false" | "FALSE" | "False" => Value::Bool(false),
        _ => Value::String(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params_of(s: &str) -> Option<Value> {
        parse_invocation(s).unwrap().params.map(Value::Object)
    }

    #[test]
    fn test_basic_invocation() {
        let inv = parse_invocation("cfgsrc:selector").unwrap();
        assert_eq!(inv.name, "cfgsrc");
        assert_eq!(inv.selector, "selector");
        assert!(inv.params.is_none());
    }

    #[test]
    fn test_missing_selector() {
        let err = parse_invocation("cfgsrc").unwrap_err();
        assert!(matches!(err, ParseError::MissingSelector { .. }));
    }

    #[test]
    fn test_empty_name() {
        let err = parse_invocation(" :selector").unwrap_err();
        assert!(matches!(err, ParseError::EmptyName { .. }));
    }

    #[test]
    fn test_trims_name_and_selector() {
        let inv = parse_invocation(" tstcfgsrc: int_key ").unwrap();
        assert_eq!(inv.name, "tstcfgsrc");
        assert_eq!(inv.selector, "int_key");
    }

    #[test]
    fn test_qualified_name() {
        let inv = parse_invocation("tstcfgsrc/named:int_key").unwrap();
        assert_eq!(inv.name, "tstcfgsrc/named");
    }

    #[test]
    fn test_typed_params() {
        assert_eq!(
            params_of("cfgsrc:selector?p0=1&p1=a_string&p2=true"),
            Some(json!({"p0": 1, "p1": "a_string", "p2": true}))
        );
    }

    #[test]
    fn test_params_without_value_are_null() {
        assert_eq!(
            params_of("cfgsrc:selector?p0&p1&p2"),
            Some(json!({"p0": null, "p1": null, "p2": null}))
        );
        assert_eq!(
            params_of("cfgsrc:selector?no_closing="),
            Some(json!({"no_closing": null}))
        );
    }

    #[test]
    fn test_repeated_params_become_array() {
        assert_eq!(
            params_of("cfgsrc:selector?p0=0&p0=1&p0=2&p1=done"),
            Some(json!({"p0": [0, 1, 2], "p1": "done"}))
        );
    }

    #[test]
    fn test_url_encoded_value() {
        assert_eq!(
            params_of("cfgsrc:selector?p0=contains+%3D+and+%26+too"),
            Some(json!({"p0": "contains = and & too"}))
        );
    }

    #[test]
    fn test_integer_wins_over_bool() {
        assert_eq!(
            params_of("cfgsrc:selector?a=1&b=0&c=T&d=False&e=yes"),
            Some(json!({"a": 1, "b": 0, "c": true, "d": false, "e": "yes"}))
        );
    }

    #[test]
    fn test_empty_query_has_no_params() {
        assert!(parse_invocation("cfgsrc:selector?").unwrap().params.is_none());
    }

    #[test]
    fn test_invalid_param_name() {
        let err = parse_invocation("tstcfgsrc:selector?{invalid}").unwrap_err();
        assert!(matches!(err, ParseError::InvalidParamName { .. }));
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let s = "cfgsrc:sel?b=2&a=x&b=3";
        assert_eq!(parse_invocation(s).unwrap(), parse_invocation(s).unwrap());
    }
}
