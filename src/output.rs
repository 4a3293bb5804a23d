//! Rendering of command results.
//!
//! `--json` prints one envelope per invocation on stdout. Otherwise a header
//! line is followed by optional sections, each a bulleted list.

use serde::Serialize;

use crate::error::{exit_codes, Error, Result};

pub const SCHEMA_VERSION: &str = "simplr.v1";

/// Top-level command words that take a subcommand.
const GROUPS: [&str; 4] = ["task", "category", "profile", "badge"];

/// Global flags whose value is a separate argument.
const VALUE_FLAGS: [&str; 3] = ["--data-dir", "--profile", "--events"];

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human-readable result of one command.
#[derive(Debug, Clone, Default)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// `key: value` line; an empty value prints the key alone.
    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "no_lines")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "no_lines")]
    next_steps: &'a [String],
}

fn no_lines(lines: &&[String]) -> bool {
    lines.is_empty()
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn print_envelope<T: Serialize>(envelope: &Envelope<'_, T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        return print_envelope(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data: Some(data),
            error: None,
            warnings: human.map(|h| h.warnings.as_slice()).unwrap_or_default(),
            next_steps: human.map(|h| h.next_steps.as_slice()).unwrap_or_default(),
        });
    }
    if let (false, Some(human)) = (options.quiet, human) {
        println!("{}", format_human(human));
    }
    Ok(())
}

/// Report a failed command. Human errors go to stderr with the first hint.
pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let hints = error_next_steps(err);
    if json {
        return print_envelope::<()>(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            data: None,
            error: Some(ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            }),
            warnings: &[],
            next_steps: &hints,
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = hints.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    let summary: Vec<String> = output
        .summary
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{key}: {value}")
            }
        })
        .collect();
    for (title, items) in [
        ("Summary", summary.as_slice()),
        ("Details", output.details.as_slice()),
        ("Warnings", output.warnings.as_slice()),
        ("Next steps", output.next_steps.as_slice()),
    ] {
        if items.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("{title}:"));
        lines.extend(items.iter().map(|item| format!("- {item}")));
    }

    lines.join("\n")
}

/// Best-effort command name for error envelopes, read before clap parses.
pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

fn command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut words = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            args.next();
        } else if !arg.starts_with('-') {
            words.push(arg);
        }
    }
    let mut words = words.into_iter();
    let Some(command) = words.next() else {
        return "simplr".to_string();
    };
    if !GROUPS.contains(&command.as_str()) {
        return command;
    }
    match words.next() {
        Some(sub) => format!("{command} {sub}"),
        None => command,
    }
}

fn error_kind(err: &Error) -> &'static str {
    if err.exit_code() == exit_codes::USER_ERROR {
        "user_error"
    } else {
        "operation_failed"
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    let hint = match err {
        Error::TaskNotFound(_) => "simplr task list",
        Error::CategoryNotFound(_) => "simplr category list",
        Error::BuiltinCategory(_) => "built-in categories can be renamed but not deleted",
        Error::UnknownProfile(_) => "simplr profile show",
        Error::InvalidConfig(_) => "fix simplr.toml then retry",
        Error::LockFailed(_) => "retry once the other simplr process exits",
        _ => return Vec::new(),
    };
    vec![hint.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn human_output_lists_sections_in_order() {
        let mut human = HumanOutput::new("simplr task add: created");
        human.push_summary("id", "t1");
        human.push_summary("reminder", "");
        human.push_warning("reminder rejected");
        human.push_next_step("simplr task list");

        let rendered = format_human(&human);
        assert!(rendered.starts_with("simplr task add: created\n"));
        assert!(rendered.contains("- id: t1"));
        assert!(rendered.contains("- reminder\n"));
        let warnings = rendered.find("Warnings:").expect("warnings");
        let next = rendered.find("Next steps:").expect("next steps");
        assert!(warnings < next);
        assert!(!rendered.contains("Details:"));
    }

    #[test]
    fn command_name_includes_group_subcommand() {
        assert_eq!(command_name(args(&["--json", "task", "done", "abc"])), "task done");
        assert_eq!(command_name(args(&["maintain", "--quiet"])), "maintain");
        assert_eq!(command_name(args(&["search", "milk"])), "search");
        assert_eq!(command_name(args(&["profile"])), "profile");
        assert_eq!(
            command_name(args(&["--events", "out.jsonl", "--profile", "work", "task", "rm", "x"])),
            "task rm"
        );
        assert_eq!(command_name(Vec::new()), "simplr");
    }

    #[test]
    fn user_errors_get_a_hint() {
        let err = Error::TaskNotFound("t9".to_string());
        assert_eq!(error_kind(&err), "user_error");
        assert_eq!(error_next_steps(&err), vec!["simplr task list".to_string()]);

        let err = Error::OperationFailed("disk".to_string());
        assert_eq!(error_kind(&err), "operation_failed");
        assert!(error_next_steps(&err).is_empty());
    }
}
