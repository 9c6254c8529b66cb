use colored::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::Result as RustylineResult;
use rustyline::{Context, Editor, Helper};

use crate::catalog::FunctionDescriptor;
use crate::error::{ScriptError, ScriptResult};
use crate::value::{coerce, Arg};

const PAGE_SIZE: usize = 15;

/// Substrings that mark a function as one that may change or delete data.
pub const DESTRUCTIVE_KEYWORDS: [&str; 20] = [
    "delete", "remove", "destroy", "drop", "clear", "purge", "wipe", "update", "edit", "modify",
    "change", "set", "patch", "create", "add", "insert", "save", "write", "post", "put",
];

pub fn is_destructive(function_name: &str) -> bool {
    let lower = function_name.to_lowercase();
    DESTRUCTIVE_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// An entry in a selection menu. `key` is what the operator may type instead
/// of the entry number.
#[derive(Debug, Clone)]
pub struct Choice {
    pub label: String,
    pub key: String,
}

/// Operator interaction used by the selector and the executor.
pub trait Prompter {
    /// Index of the chosen entry, or `None` if the operator backed out.
    fn select(&mut self, message: &str, choices: &[Choice]) -> ScriptResult<Option<usize>>;

    fn confirm(&mut self, message: &str, default: bool) -> ScriptResult<bool>;

    fn input(&mut self, message: &str) -> ScriptResult<String>;
}

/// Completes choice keys (function names) at the selection prompt.
#[derive(Clone, Default)]
struct ChoiceCompleter {
    keys: Vec<String>,
}

impl ChoiceCompleter {
    fn get_completions(&self, line: &str, pos: usize) -> Vec<Pair> {
        let typed = line[..pos].trim_start();
        if typed.is_empty() {
            return vec![];
        }
        self.keys
            .iter()
            .filter(|key| key.starts_with(typed))
            .map(|key| Pair {
                display: key.clone(),
                replacement: key.clone(),
            })
            .collect()
    }
}

impl Completer for ChoiceCompleter {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> RustylineResult<(usize, Vec<Pair>)> {
        let start = line.len() - line.trim_start().len();
        Ok((start.min(pos), self.get_completions(line, pos)))
    }
}

impl Hinter for ChoiceCompleter {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for ChoiceCompleter {}

impl Validator for ChoiceCompleter {}

impl Helper for ChoiceCompleter {}

/// Line-edited terminal prompts.
pub struct TerminalPrompter {
    editor: Editor<ChoiceCompleter, DefaultHistory>,
}

impl TerminalPrompter {
    pub fn new() -> ScriptResult<Self> {
        let editor = Editor::<ChoiceCompleter, DefaultHistory>::new()
            .map_err(|e| ScriptError::PromptError(e.to_string()))?;
        Ok(Self { editor })
    }

    fn read_line(&mut self, prompt: &str) -> ScriptResult<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let _ = self.editor.add_history_entry(line.as_str());
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(ScriptError::PromptError(err.to_string())),
        }
    }

    fn print_page(message: &str, choices: &[Choice], page: usize) {
        let pages = choices.len().div_ceil(PAGE_SIZE).max(1);
        println!();
        println!("{} {}", "?".green().bold(), message.bold());
        let start = page * PAGE_SIZE;
        for choice in choices.iter().skip(start).take(PAGE_SIZE) {
            println!("  {}", choice.label);
        }
        if pages > 1 {
            println!(
                "{}",
                format!("  page {}/{} (n: next, p: previous)", page + 1, pages).bright_black()
            );
        }
    }
}

impl Prompter for TerminalPrompter {
    fn select(&mut self, message: &str, choices: &[Choice]) -> ScriptResult<Option<usize>> {
        self.editor.set_helper(Some(ChoiceCompleter {
            keys: choices.iter().map(|c| c.key.clone()).collect(),
        }));

        let pages = choices.len().div_ceil(PAGE_SIZE).max(1);
        let mut page = 0;
        Self::print_page(message, choices, page);

        loop {
            let prompt = format!("{} ", "select>".green().bold());
            let Some(line) = self.read_line(&prompt)? else {
                return Ok(None);
            };

            match line.trim() {
                "" => Self::print_page(message, choices, page),
                "n" | "next" => {
                    page = (page + 1) % pages;
                    Self::print_page(message, choices, page);
                }
                "p" | "prev" => {
                    page = (page + pages - 1) % pages;
                    Self::print_page(message, choices, page);
                }
                "q" | "quit" => return Ok(None),
                input => {
                    let by_number = input
                        .parse::<usize>()
                        .ok()
                        .filter(|n| (1..=choices.len()).contains(n))
                        .map(|n| n - 1);
                    let index = by_number.or_else(|| choices.iter().position(|c| c.key == input));
                    match index {
                        Some(i) => return Ok(Some(i)),
                        None => eprintln!("{} {}", "Invalid selection:".red(), input),
                    }
                }
            }
        }
    }

    fn confirm(&mut self, message: &str, default: bool) -> ScriptResult<bool> {
        self.editor.set_helper(None);
        let hint = if default { "(Y/n)" } else { "(y/N)" };
        loop {
            let prompt = format!("{} {} {} ", "?".green().bold(), message, hint.bright_black());
            let Some(line) = self.read_line(&prompt)? else {
                return Ok(false);
            };
            match line.trim().to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => eprintln!("{}", "Please answer y or n.".yellow()),
            }
        }
    }

    fn input(&mut self, message: &str) -> ScriptResult<String> {
        self.editor.set_helper(None);
        let prompt = format!("{} {} ", "?".green().bold(), message);
        self.read_line(&prompt)?
            .ok_or_else(|| ScriptError::PromptError("input cancelled".to_string()))
    }
}

/// Menu over the catalog. Returns the qualified name of the chosen function,
/// or `None` when cancelled or when a destructive function was not confirmed.
pub fn select_function<P: Prompter>(
    prompter: &mut P,
    catalog: &[FunctionDescriptor],
) -> ScriptResult<Option<String>> {
    if catalog.is_empty() {
        println!("No functions found.");
        return Ok(None);
    }

    let mut choices: Vec<Choice> = catalog
        .iter()
        .enumerate()
        .map(|(index, function)| {
            let warning = if is_destructive(&function.function_name) {
                format!("{}", "⚠️  ".red())
            } else {
                String::new()
            };
            Choice {
                label: format!(
                    "{:>2}. {}{} → {}{}",
                    index + 1,
                    warning,
                    function.file_stem().cyan(),
                    function.function_name.yellow(),
                    function.params_label().bright_black()
                ),
                key: function.qualified_name.clone(),
            }
        })
        .collect();
    choices.push(Choice {
        label: format!("{:>2}. {}", catalog.len() + 1, "❌ Cancel".red()),
        key: "cancel".to_string(),
    });

    let selected = match prompter.select("Select a function to execute:", &choices)? {
        Some(index) if index < catalog.len() => &catalog[index],
        _ => return Ok(None),
    };

    if is_destructive(&selected.function_name) && !confirm_destructive(prompter, &selected.qualified_name)? {
        println!("{}", "Operation cancelled.".yellow());
        return Ok(None);
    }

    Ok(Some(selected.qualified_name.clone()))
}

fn confirm_destructive<P: Prompter>(prompter: &mut P, qualified_name: &str) -> ScriptResult<bool> {
    println!("{}", "\n⚠️  WARNING: This function may modify or delete data!".red());
    println!("{}", format!("Function: {}", qualified_name).yellow());
    prompter.confirm("Are you sure you want to execute this function?", false)
}

/// Ask for every parameter in order; empty input is refused.
pub fn prompt_for_arguments<P: Prompter>(
    prompter: &mut P,
    parameters: &[String],
    function_name: &str,
) -> ScriptResult<Vec<Arg>> {
    println!(
        "{}",
        format!("\n🔧 Function {} requires arguments:", function_name.cyan()).yellow()
    );

    let mut args = Vec::with_capacity(parameters.len());
    for param in parameters {
        let raw = loop {
            let value = prompter.input(&format!("Enter value for parameter \"{}\":", param.cyan()))?;
            let trimmed = value.trim();
            if trimmed.is_empty() {
                eprintln!(
                    "{}",
                    "Parameter cannot be empty. Use \"null\" for null values.".red()
                );
                continue;
            }
            break trimmed.to_string();
        };

        let arg = coerce(&raw);
        println!("{}", format!("  ✓ {} = {}", param, arg.to_string().cyan()).bright_black());
        args.push(arg);
    }

    Ok(args)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedPrompter;
    use super::*;
    use serde_json::json;

    fn descriptor(file: &str, function: &str, params: &[&str]) -> FunctionDescriptor {
        let parameters: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        FunctionDescriptor {
            qualified_name: format!("{}:{}", file, function),
            display_name: format!("{}:{}({})", file, function, parameters.join(", ")),
            file_name: file.to_string(),
            function_name: function.to_string(),
            parameters,
        }
    }

    #[test]
    fn destructive_keywords_match_case_insensitively() {
        assert!(is_destructive("deleteUser"));
        assert!(is_destructive("BULK_INSERT"));
        assert!(is_destructive("resetCounters"));
        assert!(!is_destructive("list_users"));
        assert!(!is_destructive("getActiveUsers"));
    }

    #[test]
    fn safe_function_is_selected_without_confirmation() {
        let catalog = vec![descriptor("users.cql", "list_users", &[])];
        let mut prompter = ScriptedPrompter::default();
        prompter.selections.push_back(Some(0));

        let selected = select_function(&mut prompter, &catalog).unwrap();

        assert_eq!(selected.as_deref(), Some("users.cql:list_users"));
        assert_eq!(prompter.asked.len(), 1);
    }

    #[test]
    fn declining_destructive_function_cancels() {
        let catalog = vec![
            descriptor("users.cql", "list_users", &[]),
            descriptor("users.cql", "delete_user", &["user_id"]),
        ];
        let mut prompter = ScriptedPrompter::default();
        prompter.selections.push_back(Some(1));
        prompter.confirms.push_back(false);

        let selected = select_function(&mut prompter, &catalog).unwrap();

        assert_eq!(selected, None);
        assert_eq!(prompter.asked[1], "Are you sure you want to execute this function?");
    }

    #[test]
    fn confirming_destructive_function_selects_it() {
        let catalog = vec![descriptor("users.cql", "delete_user", &["user_id"])];
        let mut prompter = ScriptedPrompter::default();
        prompter.selections.push_back(Some(0));
        prompter.confirms.push_back(true);

        let selected = select_function(&mut prompter, &catalog).unwrap();
        assert_eq!(selected.as_deref(), Some("users.cql:delete_user"));
    }

    #[test]
    fn cancel_entry_returns_none() {
        let catalog = vec![descriptor("users.cql", "list_users", &[])];
        let mut prompter = ScriptedPrompter::default();
        prompter.selections.push_back(Some(1));

        assert_eq!(select_function(&mut prompter, &catalog).unwrap(), None);
    }

    #[test]
    fn empty_catalog_returns_none() {
        let mut prompter = ScriptedPrompter::default();
        assert_eq!(select_function(&mut prompter, &[]).unwrap(), None);
        assert!(prompter.asked.is_empty());
    }

    #[test]
    fn argument_prompts_skip_empty_input_and_coerce() {
        let mut prompter = ScriptedPrompter::with_inputs(&["  ", "42", "'abc'"]);
        let params = vec!["age".to_string(), "name".to_string()];

        let args = prompt_for_arguments(&mut prompter, &params, "find").unwrap();

        assert_eq!(args, vec![Arg::Value(json!(42)), Arg::Value(json!("abc"))]);
        assert_eq!(prompter.asked.len(), 3);
    }

    #[test]
    fn completer_offers_matching_keys() {
        let completer = ChoiceCompleter {
            keys: vec!["users.cql:list_users".into(), "audit.cql:recent".into()],
        };
        let pairs = completer.get_completions("users", 5);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].replacement, "users.cql:list_users");
    }
}
