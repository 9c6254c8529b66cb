use colored::*;
use prettytable::{format, Cell, Row, Table};
use serde_json::{Map, Value};
use terminal_size::{terminal_size, Width};

const MAX_COLUMNS: usize = 6;
const MAX_CELL_WIDTH: usize = 50;
const MAX_HEADER_WIDTH: usize = 15;
const MAX_TEXT_WIDTH: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Get terminal width or default to 120
fn get_terminal_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(120)
}

/// Truncate string to fit max width with ellipsis
fn truncate_str(s: &str, max_width: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_width {
        s.to_string()
    } else if max_width <= 3 {
        s.chars().take(max_width).collect()
    } else {
        let mut result: String = s.chars().take(max_width - 3).collect();
        result.push_str("...");
        result
    }
}

/// Render the value returned by a script function.
pub fn render(result: &Value, function_name: &str, format: OutputFormat) -> String {
    let mut output = format!("{}\n", format!("\n📊 Results from {}:", function_name).green());
    output.push_str(&render_body(result, format, get_terminal_width()));
    output
}

fn render_body(result: &Value, format: OutputFormat, terminal_width: usize) -> String {
    match result {
        Value::Null => format!("{}", "No data returned".yellow()),
        Value::Object(map) if matches!(map.get("docs"), Some(Value::Array(_))) => {
            let docs = map.get("docs").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
            if docs.is_empty() {
                let columns: Vec<&str> = map
                    .get("columns")
                    .and_then(Value::as_array)
                    .map(|cols| cols.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                if columns.is_empty() {
                    return format!("{}", "No documents found".yellow());
                }
                return format!("{} (columns: {})", "No documents found".yellow(), columns.join(", "));
            }
            render_rows(docs, format, terminal_width)
        }
        Value::Array(items) => {
            if items.is_empty() {
                return format!("{}", "Empty array".yellow());
            }
            render_rows(items, format, terminal_width)
        }
        Value::Object(_) => match format {
            OutputFormat::Table => format_as_table(std::slice::from_ref(result), terminal_width),
            OutputFormat::Json => format_as_json(result),
        },
        Value::String(s) => format!("{}", s.cyan()),
        other => format!("{}", other.to_string().cyan()),
    }
}

fn render_rows(rows: &[Value], format: OutputFormat, terminal_width: usize) -> String {
    match format {
        OutputFormat::Table => format_as_table(rows, terminal_width),
        OutputFormat::Json => format_as_json(&Value::Array(rows.to_vec())),
    }
}

fn format_as_json(data: &Value) -> String {
    let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    let mut output = format!("{}\n", pretty.cyan());

    if let Value::Array(items) = data {
        output.push_str(&format!("{}\n", format!("\n📈 Total records: {}", items.len()).green()));
    }

    output.push_str(&format!(
        "{}",
        "\n💡 Use --table flag to display in table format".bright_black()
    ));
    output
}

fn format_as_table(rows: &[Value], terminal_width: usize) -> String {
    // Union of keys in first-seen order.
    let mut keys: Vec<&String> = Vec::new();
    for map in rows.iter().filter_map(Value::as_object) {
        for key in map.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    if keys.is_empty() {
        return format!("{}", "No properties to display".yellow());
    }

    let shown = &keys[..keys.len().min(MAX_COLUMNS)];
    let hidden = keys.len() - shown.len();
    let col_width = (terminal_width / shown.len()).clamp(3, MAX_CELL_WIDTH);

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    table.set_titles(Row::new(
        shown
            .iter()
            .map(|key| Cell::new(&truncate_str(key, MAX_HEADER_WIDTH.min(col_width))).style_spec("Fc"))
            .collect(),
    ));

    let empty = Map::new();
    for row in rows {
        let map = row.as_object().unwrap_or(&empty);
        let cells = shown
            .iter()
            .map(|key| format_cell(map.get(key.as_str()), col_width))
            .collect();
        table.add_row(Row::new(cells));
    }

    let mut output = table.to_string();
    output.push_str(&format!("{}\n", format!("\n📈 Total records: {}", rows.len()).green()));

    if hidden > 0 {
        output.push_str(&format!(
            "{}\n",
            format!("⚠️  {} columns hidden. Use JSON format to see all data.", hidden).yellow()
        ));
    }

    output
}

fn format_cell(value: Option<&Value>, col_width: usize) -> Cell {
    match value {
        None | Some(Value::Null) => Cell::new("null").style_spec("FD"),
        Some(Value::Bool(true)) => Cell::new("true").style_spec("Fg"),
        Some(Value::Bool(false)) => Cell::new("false").style_spec("Fr"),
        Some(Value::Number(n)) => {
            Cell::new(&truncate_str(&n.to_string(), MAX_CELL_WIDTH.min(col_width))).style_spec("Fm")
        }
        Some(Value::String(s)) => Cell::new(&truncate_str(s, MAX_TEXT_WIDTH.min(col_width))),
        Some(nested) => {
            Cell::new(&truncate_str(&nested.to_string(), MAX_TEXT_WIDTH.min(col_width))).style_spec("Fy")
        }
    }
}
