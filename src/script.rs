use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{ScriptError, ScriptResult};
use crate::signature::{self, Param, Pattern};
use crate::value::{to_cql_literal, Arg};

fn fn_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:export\s+)?(?:async\s+)?(?:fn|function)\s+([A-Za-z_][\w-]*)\s*\((.*)\)\s*;?\s*$")
            .expect("valid regex")
    })
}

fn name_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^name\s*:\s*([A-Za-z_][\w-]*)!?\s*$").expect("valid regex"))
}

fn batch_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*BEGIN\s+(?:(?:UNLOGGED|COUNTER)\s+)?BATCH\b").expect("valid regex"))
}

fn batch_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bAPPLY\s+BATCH\s*$").expect("valid regex"))
}

fn keyspace_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^keyspace\s*:\s*([A-Za-z_]\w*)\s*$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text(String),
    Param(String),
}

/// One CQL statement with its placeholders left unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pieces: Vec<Piece>,
}

impl Statement {
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Param(name) => Some(name.as_str()),
            Piece::Text(_) => None,
        })
    }

    /// Substitute every placeholder with the CQL literal of its bound value.
    pub fn render(&self, bindings: &HashMap<String, Value>) -> String {
        self.pieces
            .iter()
            .map(|p| match p {
                Piece::Text(text) => text.clone(),
                Piece::Param(name) => bindings
                    .get(name)
                    .map(to_cql_literal)
                    .unwrap_or_else(|| "null".to_string()),
            })
            .collect()
    }

    /// The statement as written, placeholders included.
    pub fn source(&self) -> String {
        self.pieces
            .iter()
            .map(|p| match p {
                Piece::Text(text) => text.clone(),
                Piece::Param(name) => format!(":{}", name),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ScriptFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub statements: Vec<Statement>,
}

impl ScriptFunction {
    /// Parameter names as shown in the catalog.
    pub fn parameter_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.text.clone()).collect()
    }

    /// Match positional arguments to parameters and resolve every placeholder
    /// to a value. Missing arguments fall back to defaults, then `null`.
    pub fn bind(&self, args: &[Arg]) -> HashMap<String, Value> {
        let mut bindings = HashMap::new();

        for (i, param) in self.params.iter().enumerate() {
            let value = match args.get(i).cloned().unwrap_or(Arg::Undefined) {
                Arg::Value(v) => Some(v),
                Arg::Undefined => param.default_arg().and_then(Arg::into_value),
            };

            match &param.pattern {
                Pattern::Name(name) => {
                    bindings.insert(name.clone(), value.unwrap_or(Value::Null));
                }
                Pattern::Object(fields) => {
                    for field in fields {
                        let found = value.as_ref().and_then(|v| v.get(&field.name)).cloned();
                        bindings.insert(field.name.clone(), field_value(found, field));
                    }
                }
                Pattern::Array(fields) => {
                    for (j, field) in fields.iter().enumerate() {
                        let found = value
                            .as_ref()
                            .and_then(Value::as_array)
                            .and_then(|items| items.get(j))
                            .cloned();
                        bindings.insert(field.name.clone(), field_value(found, field));
                    }
                }
            }
        }

        bindings
    }
}

fn field_value(found: Option<Value>, field: &signature::Field) -> Value {
    found
        .or_else(|| {
            field
                .default
                .as_deref()
                .map(crate::value::coerce)
                .and_then(Arg::into_value)
        })
        .unwrap_or(Value::Null)
}

#[derive(Debug, Clone)]
pub struct ScriptModule {
    pub file_name: String,
    pub path: PathBuf,
    pub keyspace: Option<String>,
    pub functions: Vec<ScriptFunction>,
}

impl ScriptModule {
    pub fn function(&self, name: &str) -> Option<&ScriptFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }
}

struct Pending {
    name: String,
    signature: Option<String>,
    line: usize,
    body: String,
}

enum Header {
    Function { name: String, signature: Option<String> },
    Keyspace(String),
}

fn comment_text(trimmed: &str) -> Option<&str> {
    trimmed
        .strip_prefix("--")
        .or_else(|| trimmed.strip_prefix("//"))
        .map(str::trim)
}

fn parse_header(comment: &str) -> Option<Header> {
    if let Some(caps) = fn_header().captures(comment) {
        return Some(Header::Function {
            name: caps[1].to_string(),
            signature: Some(caps[2].to_string()),
        });
    }
    if let Some(caps) = name_header().captures(comment) {
        return Some(Header::Function {
            name: caps[1].to_string(),
            signature: None,
        });
    }
    keyspace_directive()
        .captures(comment)
        .map(|caps| Header::Keyspace(caps[1].to_string()))
}

/// Parse a `.cql` script. Each function starts at a header comment and owns
/// every line up to the next header. All header dialects normalize to the
/// same [`ScriptFunction`]:
///
/// ```text
/// -- keyspace: app
///
/// -- fn users_by_age(min_age, max_age = 100)
/// SELECT * FROM users WHERE age >= :min_age AND age <= :max_age ALLOW FILTERING;
///
/// -- export async function delete_user(user_id)
/// DELETE FROM users WHERE id = :user_id;
///
/// -- name: active-users
/// SELECT * FROM users WHERE active = true ALLOW FILTERING;
/// ```
pub fn parse_module(file_name: &str, path: &Path, source: &str) -> ScriptResult<ScriptModule> {
    let mut keyspace = None;
    let mut functions: Vec<ScriptFunction> = Vec::new();
    let mut preamble = String::new();
    let mut pending: Option<Pending> = None;

    for (idx, line) in source.lines().enumerate() {
        let header = comment_text(line.trim()).and_then(parse_header);

        match header {
            Some(Header::Function { name, signature }) => {
                match pending.take() {
                    Some(prev) => functions.push(finish_function(file_name, prev, &functions)?),
                    None => check_preamble(file_name, &preamble)?,
                }
                pending = Some(Pending {
                    name,
                    signature,
                    line: idx + 1,
                    body: String::new(),
                });
            }
            Some(Header::Keyspace(name)) if pending.is_none() => {
                keyspace = Some(name);
            }
            _ => {
                let target = match pending.as_mut() {
                    Some(p) => &mut p.body,
                    None => &mut preamble,
                };
                target.push_str(line);
                target.push('\n');
            }
        }
    }

    match pending.take() {
        Some(last) => functions.push(finish_function(file_name, last, &functions)?),
        None => check_preamble(file_name, &preamble)?,
    }

    if functions.is_empty() {
        return Err(ScriptError::load(file_name, "no functions declared"));
    }

    Ok(ScriptModule {
        file_name: file_name.to_string(),
        path: path.to_path_buf(),
        keyspace,
        functions,
    })
}

fn check_preamble(file_name: &str, preamble: &str) -> ScriptResult<()> {
    let statements = split_statements(preamble).map_err(|e| ScriptError::load(file_name, e))?;
    if let Some(first) = statements.first() {
        return Err(ScriptError::load(
            file_name,
            format!("statement outside of a function: {}", first.source()),
        ));
    }
    Ok(())
}

fn finish_function(
    file_name: &str,
    pending: Pending,
    existing: &[ScriptFunction],
) -> ScriptResult<ScriptFunction> {
    let context = |reason: String| {
        ScriptError::load(file_name, format!("function `{}` (line {}): {}", pending.name, pending.line, reason))
    };

    if existing.iter().any(|f| f.name == pending.name) {
        return Err(context("declared more than once".to_string()));
    }

    let statements = split_statements(&pending.body).map_err(context)?;
    if statements.is_empty() {
        return Err(context("no statements".to_string()));
    }

    let params = match &pending.signature {
        Some(sig) => signature::parse_params(sig).map_err(context)?,
        None => {
            let mut seen = HashSet::new();
            statements
                .iter()
                .flat_map(Statement::placeholders)
                .filter(|name| seen.insert(name.to_string()))
                .map(Param::named)
                .collect()
        }
    };

    let mut bound = HashSet::new();
    for name in params.iter().flat_map(Param::bound_names) {
        if !bound.insert(name) {
            return Err(context(format!("parameter `{}` bound twice", name)));
        }
    }
    for placeholder in statements.iter().flat_map(Statement::placeholders) {
        if !bound.contains(placeholder) {
            return Err(context(format!("unknown parameter :{}", placeholder)));
        }
    }

    Ok(ScriptFunction {
        name: pending.name,
        params,
        statements,
    })
}

/// Split a body into statements on `;`, skipping string literals, quoted
/// identifiers, `$$` blocks and comments. Comments are dropped. A
/// `BEGIN [UNLOGGED|COUNTER] BATCH` block stays one statement through its
/// `APPLY BATCH`.
pub fn split_statements(body: &str) -> Result<Vec<Statement>, String> {
    let chars: Vec<char> = body.chars().collect();
    let mut statements = Vec::new();
    let mut pieces: Vec<Piece> = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '\'' | '"' => {
                let end = scan_quoted(&chars, i, c)
                    .ok_or_else(|| format!("unterminated {} literal", if c == '\'' { "string" } else { "identifier" }))?;
                text.extend(&chars[i..=end]);
                i = end + 1;
            }
            '$' if next == Some('$') => {
                let end = find_pair(&chars, i + 2, '$', '$').ok_or("unterminated $$ block")?;
                text.extend(&chars[i..end + 2]);
                i = end + 2;
            }
            '-' if next == Some('-') => i = skip_line(&chars, i),
            '/' if next == Some('/') => i = skip_line(&chars, i),
            '/' if next == Some('*') => {
                let end = find_pair(&chars, i + 2, '*', '/').ok_or("unterminated block comment")?;
                text.push(' ');
                i = end + 2;
            }
            ';' if in_open_batch(&pieces, &text) => {
                text.push(c);
                i += 1;
            }
            ';' => {
                flush_text(&mut pieces, &mut text);
                push_statement(&mut statements, std::mem::take(&mut pieces));
                i += 1;
            }
            ':' if next.is_some_and(|n| n.is_ascii_alphabetic() || n == '_')
                && (i == 0 || chars[i - 1] != ':') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                flush_text(&mut pieces, &mut text);
                pieces.push(Piece::Param(chars[start..end].iter().collect()));
                i = end;
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }

    if in_open_batch(&pieces, &text) {
        return Err("BEGIN BATCH without APPLY BATCH".to_string());
    }
    flush_text(&mut pieces, &mut text);
    push_statement(&mut statements, pieces);
    Ok(statements)
}

fn in_open_batch(pieces: &[Piece], text: &str) -> bool {
    let mut so_far: String = pieces
        .iter()
        .map(|p| match p {
            Piece::Text(t) => t.as_str(),
            Piece::Param(_) => "?",
        })
        .collect();
    so_far.push_str(text);
    batch_open().is_match(&so_far) && !batch_close().is_match(&so_far)
}

/// Index of the closing quote; doubled quotes are escapes.
fn scan_quoted(chars: &[char], open: usize, quote: char) -> Option<usize> {
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_pair(chars: &[char], from: usize, a: char, b: char) -> Option<usize> {
    (from..chars.len().saturating_sub(1)).find(|&j| chars[j] == a && chars[j + 1] == b)
}

fn skip_line(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|&c| c == '\n')
        .map(|p| from + p)
        .unwrap_or(chars.len())
}

fn flush_text(pieces: &mut Vec<Piece>, text: &mut String) {
    if !text.is_empty() {
        pieces.push(Piece::Text(std::mem::take(text)));
    }
}

fn push_statement(statements: &mut Vec<Statement>, mut pieces: Vec<Piece>) {
    let blank = pieces.iter().all(|p| matches!(p, Piece::Text(t) if t.trim().is_empty()));
    if blank {
        return;
    }

    if let Some(Piece::Text(first)) = pieces.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(Piece::Text(last)) = pieces.last_mut() {
        *last = last.trim_end().to_string();
    }
    pieces.retain(|p| !matches!(p, Piece::Text(t) if t.is_empty()));

    statements.push(Statement { pieces });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(source: &str) -> ScriptResult<ScriptModule> {
        parse_module("users.cql", Path::new("/scripts/users.cql"), source)
    }

    #[test]
    fn header_dialects_normalize_to_functions() {
        let module = parse(
            "-- keyspace: app\n\
             \n\
             -- fn count_users()\n\
             SELECT count(*) FROM users;\n\
             \n\
             // export async function delete_user(user_id)\n\
             DELETE FROM users WHERE id = :user_id;\n\
             \n\
             -- name: users-by-age!\n\
             SELECT * FROM users WHERE age >= :min AND age <= :max ALLOW FILTERING;\n",
        )
        .unwrap();

        assert_eq!(module.keyspace.as_deref(), Some("app"));
        assert_eq!(module.stem(), "users");
        let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["count_users", "delete_user", "users-by-age"]);
        assert!(module.function("count_users").unwrap().params.is_empty());
        assert_eq!(module.function("delete_user").unwrap().parameter_names(), vec!["user_id"]);
        assert_eq!(module.function("users-by-age").unwrap().parameter_names(), vec!["min", "max"]);
    }

    #[test]
    fn statements_split_outside_literals_and_comments() {
        let statements = split_statements(
            "INSERT INTO notes (id, body) VALUES (1, 'a; b '' c'); -- trailing; comment\n\
             /* block; comment */ SELECT \"weird;col\" FROM notes WHERE id = :id;\n\
             SELECT $$x;y$$ FROM t",
        )
        .unwrap();

        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].source(), "INSERT INTO notes (id, body) VALUES (1, 'a; b '' c')");
        assert_eq!(statements[1].source(), "SELECT \"weird;col\" FROM notes WHERE id = :id");
        assert_eq!(statements[1].placeholders().collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(statements[2].source(), "SELECT $$x;y$$ FROM t");
    }

    #[test]
    fn placeholders_inside_strings_are_text() {
        let statements = split_statements("SELECT * FROM t WHERE a = ':nope' AND b = :yes").unwrap();
        assert_eq!(statements[0].placeholders().collect::<Vec<_>>(), vec!["yes"]);
    }

    #[test]
    fn render_substitutes_literals() {
        let module = parse(
            "-- fn find(name, age = 30)\n\
             SELECT * FROM users WHERE name = :name AND age = :age;\n",
        )
        .unwrap();
        let function = module.function("find").unwrap();

        let bindings = function.bind(&[Arg::Value(json!("O'Neil"))]);
        assert_eq!(
            function.statements[0].render(&bindings),
            "SELECT * FROM users WHERE name = 'O''Neil' AND age = 30"
        );
    }

    #[test]
    fn uuid_argument_binds_to_uuid_column() {
        let module = parse("-- fn by_id(id)\nSELECT * FROM users WHERE id = :id;\n").unwrap();
        let function = module.function("by_id").unwrap();

        let bindings = function.bind(&[Arg::Value(json!("f47ac10b-58cc-4372-a567-0e02b2c3d479"))]);
        assert_eq!(
            function.statements[0].render(&bindings),
            "SELECT * FROM users WHERE id = f47ac10b-58cc-4372-a567-0e02b2c3d479"
        );
    }

    #[test]
    fn batch_block_stays_one_statement() {
        let statements = split_statements(
            "begin unlogged batch\n\
             INSERT INTO a (id) VALUES (:id);\n\
             INSERT INTO b (id) VALUES (:id);\n\
             APPLY BATCH;\n\
             SELECT * FROM a WHERE id = :id;\n",
        )
        .unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].source(),
            "begin unlogged batch\nINSERT INTO a (id) VALUES (:id);\nINSERT INTO b (id) VALUES (:id);\nAPPLY BATCH"
        );
        assert_eq!(statements[0].placeholders().count(), 2);
        assert_eq!(statements[1].source(), "SELECT * FROM a WHERE id = :id");
    }

    #[test]
    fn unterminated_batch_is_rejected() {
        let err = parse("-- fn f(id)\nBEGIN BATCH\nINSERT INTO a (id) VALUES (:id);\n").unwrap_err();
        assert!(err.to_string().contains("BEGIN BATCH without APPLY BATCH"));
    }

    #[test]
    fn destructured_params_bind_fields() {
        let module = parse(
            "-- fn insert_user({id, name, active = true}, [first_tag, second_tag])\n\
             INSERT INTO users (id, name, active, tags) VALUES (:id, :name, :active, [:first_tag, :second_tag]);\n",
        )
        .unwrap();
        let function = module.function("insert_user").unwrap();

        let bindings = function.bind(&[
            Arg::Value(json!({"id": 7, "name": "ada"})),
            Arg::Value(json!(["x"])),
        ]);
        assert_eq!(bindings["id"], json!(7));
        assert_eq!(bindings["active"], json!(true));
        assert_eq!(bindings["first_tag"], json!("x"));
        assert_eq!(bindings["second_tag"], Value::Null);
    }

    #[test]
    fn undefined_without_default_binds_null() {
        let module = parse("-- fn f(a, b)\nSELECT :a, :b FROM t;\n").unwrap();
        let function = module.function("f").unwrap();
        let bindings = function.bind(&[Arg::Undefined]);
        assert_eq!(function.statements[0].render(&bindings), "SELECT null, null FROM t");
    }

    #[test]
    fn rejects_statement_outside_function() {
        let err = parse("SELECT 1 FROM t;\n-- fn f()\nSELECT 2 FROM t;\n").unwrap_err();
        assert!(err.to_string().contains("statement outside of a function"));
    }

    #[test]
    fn leading_comments_are_allowed() {
        let module = parse("-- Users helpers\n/* owned by ops */\n-- fn f()\nSELECT 1 FROM t;\n").unwrap();
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = parse("-- fn f(a)\nSELECT * FROM t WHERE x = :b;\n").unwrap_err();
        assert!(err.to_string().contains("unknown parameter :b"));
    }

    #[test]
    fn rejects_empty_body_and_duplicates() {
        assert!(parse("-- fn f()\n-- fn g()\nSELECT 1 FROM t;\n").is_err());
        assert!(parse("-- fn f()\nSELECT 1 FROM t;\n-- fn f()\nSELECT 2 FROM t;\n").is_err());
        assert!(parse("-- just a comment\n").is_err());
    }
}
