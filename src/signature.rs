use crate::value::{coerce, Arg};

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Name(String),
    /// `{a, b = 1}` binds `a` and `b` from an object argument's fields.
    Object(Vec<Field>),
    /// `[a, b]` binds `a` and `b` from an array argument by position.
    Array(Vec<Field>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub pattern: Pattern,
    pub default: Option<String>,
    /// Source text of the pattern without its default.
    pub text: String,
}

impl Param {
    pub fn named(name: &str) -> Self {
        Param {
            pattern: Pattern::Name(name.to_string()),
            default: None,
            text: name.to_string(),
        }
    }

    /// Every placeholder name this parameter binds.
    pub fn bound_names(&self) -> Vec<&str> {
        match &self.pattern {
            Pattern::Name(name) => vec![name.as_str()],
            Pattern::Object(fields) | Pattern::Array(fields) => {
                fields.iter().map(|f| f.name.as_str()).collect()
            }
        }
    }

    pub fn default_arg(&self) -> Option<Arg> {
        self.default.as_deref().map(coerce)
    }
}

/// Parse the text between a header's parentheses, e.g.
/// `user_id, {min_age, max_age = 100}, limit = 10`. Parameters split on
/// top-level commas only; defaults follow the first top-level `=`.
pub fn parse_params(signature: &str) -> Result<Vec<Param>, String> {
    split_top_level(signature, ',')?
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_param)
        .collect()
}

fn parse_param(raw: &str) -> Result<Param, String> {
    let (pattern_text, default) = split_default(raw)?;

    let pattern = if let Some(inner) = strip_delimiters(pattern_text, '{', '}') {
        Pattern::Object(parse_fields(inner)?)
    } else if let Some(inner) = strip_delimiters(pattern_text, '[', ']') {
        Pattern::Array(parse_fields(inner)?)
    } else {
        Pattern::Name(validate_identifier(pattern_text)?.to_string())
    };

    Ok(Param {
        pattern,
        default,
        text: pattern_text.to_string(),
    })
}

fn parse_fields(inner: &str) -> Result<Vec<Field>, String> {
    let mut fields = Vec::new();
    for part in split_top_level(inner, ',')? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, default) = split_default(part)?;
        fields.push(Field {
            name: validate_identifier(name)?.to_string(),
            default,
        });
    }
    if fields.is_empty() {
        return Err("empty destructuring pattern".to_string());
    }
    Ok(fields)
}

fn split_default(raw: &str) -> Result<(&str, Option<String>), String> {
    let parts = split_top_level(raw, '=')?;
    match parts.as_slice() {
        [pattern] => Ok((pattern.trim(), None)),
        [pattern, ..] => {
            let default = raw[pattern.len() + 1..].trim();
            if default.is_empty() {
                return Err(format!("missing default value in '{}'", raw.trim()));
            }
            Ok((pattern.trim(), Some(default.to_string())))
        }
        [] => Ok((raw.trim(), None)),
    }
}

fn strip_delimiters(s: &str, open: char, close: char) -> Option<&str> {
    s.strip_prefix(open)?.strip_suffix(close)
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_identifier(s: &str) -> Result<&str, String> {
    if is_identifier(s) {
        Ok(s)
    } else {
        Err(format!("invalid parameter name '{}'", s))
    }
}

/// Split on `sep` where it is not nested in brackets or quotes.
fn split_top_level(s: &str, sep: char) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced '{}' in signature", c));
                }
            }
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err("unterminated bracket or quote in signature".to_string());
    }
    parts.push(&s[start..]);
    Ok(parts)
}
