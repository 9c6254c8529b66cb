use regex::Regex;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::OnceLock;

/// A positional invocation argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// No value supplied; the parameter default applies if there is one.
    Undefined,
    Value(Value),
}

impl Arg {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Arg::Undefined => None,
            Arg::Value(v) => Some(v),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Undefined => write!(f, "undefined"),
            Arg::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Coerce raw input into a typed argument.
///
/// Precedence: `null`/`undefined`/`true`/`false` literals, then numbers,
/// then JSON for bracket or brace delimited input, then a quote-stripped
/// string, then the input verbatim.
pub fn coerce(raw: &str) -> Arg {
    match raw {
        "null" => return Arg::Value(Value::Null),
        "undefined" => return Arg::Undefined,
        "true" => return Arg::Value(Value::Bool(true)),
        "false" => return Arg::Value(Value::Bool(false)),
        _ => {}
    }

    if let Some(number) = parse_number(raw) {
        return Arg::Value(Value::Number(number));
    }

    if (raw.starts_with('{') && raw.ends_with('}')) || (raw.starts_with('[') && raw.ends_with(']')) {
        if let Ok(value) = serde_json::from_str::<Value>(raw) {
            return Arg::Value(value);
        }
    }

    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"')) || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        return Arg::Value(Value::String(raw[1..raw.len() - 1].to_string()));
    }

    Arg::Value(Value::String(raw.to_string()))
}

pub fn coerce_all<S: AsRef<str>>(raw: &[S]) -> Vec<Arg> {
    raw.iter().map(|s| coerce(s.as_ref())).collect()
}

fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::from(i));
    }
    // Rust accepts "inf"/"nan" spellings; only plain decimal forms count.
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

fn bare_constant() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|0[xX][0-9a-fA-F]*)$")
            .expect("valid regex")
    })
}

/// Render a JSON value as a CQL literal.
///
/// UUIDs and `0x` hex strings are CQL constants of their own and stay
/// unquoted, so they bind to `uuid`, `timeuuid` and `blob` columns.
pub fn to_cql_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_literal(n),
        Value::String(s) => string_literal(s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(to_cql_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", string_literal(k), to_cql_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Integral floats print without a fraction; CQL rejects `42.0` for `int`.
fn number_literal(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

fn string_literal(s: &str) -> String {
    if bare_constant().is_match(s) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "''"))
    }
}
