// src/traffic/command.rs
//! Command-invocation payloads
//!
//! A shim sitting ahead of the real command on `PATH` forwards its argv, a
//! filtered environment snapshot and its working directory. The recorded
//! description keeps only the environment variables named by configuration,
//! with baseline values abbreviated to `$VAR` so the interesting differences
//! stand out.

use crate::traffic::literal::{self, Value};
use crate::traffic::wire;
use crate::utils::config::EnvFilter;
use crate::utils::errors::{EngineError, Result};
use std::collections::HashMap;

/// A decoded command invocation
#[derive(Debug, Clone)]
pub struct CommandDetails {
    /// argv[0] as the shim saw it, with backslashes normalized
    pub full_command: String,

    /// Basename of the invoked command
    pub command_name: String,

    /// Arguments after argv[0]
    pub args: Vec<String>,

    /// Full captured environment, used when spawning the real command
    pub environ: HashMap<String, String>,

    /// Working directory of the invocation
    pub cwd: String,

    /// `PATH` from the captured environment
    pub path: Option<String>,
}

impl CommandDetails {
    /// Decode a wire payload (argv, environment, cwd joined by the field
    /// separator) and build the description text under the given filter
    pub fn decode(payload: &str, filter: &EnvFilter) -> Result<(Self, String)> {
        let mut fields = payload.splitn(3, wire::COMMAND_FIELD_SEP);
        let (argv_text, env_text, cwd_text) = match (fields.next(), fields.next(), fields.next())
        {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                return Err(EngineError::PayloadError(
                    "command payload needs argv, environment and cwd fields".to_string(),
                ))
            }
        };

        let argv = decode_string_seq(argv_text)?;
        let first = argv.first().ok_or_else(|| {
            EngineError::PayloadError("command payload has an empty argv".to_string())
        })?;
        let environ = decode_environ(env_text)?;

        let full_command = first.replace('\\', "/");
        let command_name = full_command
            .rsplit('/')
            .next()
            .unwrap_or(full_command.as_str())
            .to_string();
        let path = environ.get("PATH").cloned();

        let details = Self {
            full_command,
            command_name,
            args: argv[1..].to_vec(),
            environ,
            cwd: cwd_text.trim_end().to_string(),
            path,
        };
        let text = details.description_text(filter);
        Ok((details, text))
    }

    /// Description text: `env 'VAR=value' ... <name> <quoted args>`
    fn description_text(&self, filter: &EnvFilter) -> String {
        let mut text = self.env_string(filter);
        text.push_str(&self.command_name);
        let arg_str = self
            .args
            .iter()
            .map(|arg| quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        if !arg_str.is_empty() {
            text.push(' ');
            text.push_str(&arg_str);
        }
        text
    }

    fn env_string(&self, filter: &EnvFilter) -> String {
        let mut entries = Vec::new();
        for var in filter.retained(&self.command_name) {
            let Some(value) = self.environ.get(var) else { continue };
            let shown = match filter.baseline_value(var) {
                Some(old) if !old.is_empty() => value.replace(old, &format!("${}", var)),
                _ => value.clone(),
            };
            entries.push(format!("'{}={}'", var, shown));
        }
        if entries.is_empty() {
            String::new()
        } else {
            format!("env {} ", entries.join(" "))
        }
    }

    #[cfg(test)]
    pub fn for_test(name: &str, args: &[&str]) -> Self {
        Self {
            full_command: name.to_string(),
            command_name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            environ: HashMap::new(),
            cwd: ".".to_string(),
            path: None,
        }
    }
}

/// Encode a wire payload the way a shim does; the engine side of the
/// contract in one place, also exercised by the tests
pub fn encode_wire_payload(argv: &[&str], environ: &[(&str, &str)], cwd: &str) -> String {
    let argv_values: Vec<Value> = argv.iter().map(|a| Value::str(*a)).collect();
    let env_values: Vec<Value> = environ
        .iter()
        .map(|(k, v)| Value::Seq(vec![Value::str(*k), Value::str(*v)]))
        .collect();
    format!(
        "{}{}{}{}{}{}",
        wire::COMMAND_LINE_PREFIX,
        literal::encode_sequence(&argv_values),
        wire::COMMAND_FIELD_SEP,
        literal::encode_sequence(&env_values),
        wire::COMMAND_FIELD_SEP,
        cwd
    )
}

fn decode_string_seq(text: &str) -> Result<Vec<String>> {
    literal::parse_sequence(text.trim())?
        .into_iter()
        .map(|value| match value {
            Value::Str(s) => Ok(s),
            other => Err(EngineError::PayloadError(format!(
                "expected a string, got {}",
                other
            ))),
        })
        .collect()
}

fn decode_environ(text: &str) -> Result<HashMap<String, String>> {
    let mut environ = HashMap::new();
    for pair in literal::parse_sequence(text.trim())? {
        match pair.as_seq() {
            Some([Value::Str(name), Value::Str(value)]) => {
                environ.insert(name.clone(), value.clone());
            }
            _ => {
                return Err(EngineError::PayloadError(format!(
                    "expected a [name, value] pair, got {}",
                    pair
                )))
            }
        }
    }
    Ok(environ)
}

/// Quote an argument for the description text. The quote character is chosen
/// to avoid the first special character found inside the argument.
fn quote(arg: &str) -> String {
    const SPECIAL: [char; 5] = ['\'', '"', '|', '*', ' '];
    for special in SPECIAL {
        if arg.contains(special) {
            let quote_char = if special == '"' { '\'' } else { '"' };
            return format!("{}{}{}", quote_char, arg, quote_char);
        }
    }
    arg.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(
        retain: &[&str],
        per_command: &[(&str, &[&str])],
        baseline: &[(&str, &str)],
    ) -> EnvFilter {
        let per_command = per_command
            .iter()
            .map(|(cmd, vars)| {
                (
                    cmd.to_string(),
                    vars.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect();
        EnvFilter::new(retain.iter().map(|v| v.to_string()).collect(), per_command)
            .with_baseline(
                baseline
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
    }

    #[test]
    fn test_decode_basic_invocation() {
        let payload = encode_wire_payload(
            &["/usr/bin/echo", "hello"],
            &[("PATH", "/usr/bin:/bin")],
            "/work",
        );
        let payload = payload.strip_prefix(wire::COMMAND_LINE_PREFIX).unwrap();
        let (details, text) = CommandDetails::decode(payload, &filter_with(&[], &[], &[])).unwrap();

        assert_eq!(details.command_name, "echo");
        assert_eq!(details.full_command, "/usr/bin/echo");
        assert_eq!(details.args, vec!["hello"]);
        assert_eq!(details.cwd, "/work");
        assert_eq!(details.path.as_deref(), Some("/usr/bin:/bin"));
        assert_eq!(text, "echo hello");
    }

    #[test]
    fn test_decode_windows_style_argv0() {
        let payload = encode_wire_payload(&["C:\\tools\\make.exe"], &[], "/work");
        let payload = payload.strip_prefix(wire::COMMAND_LINE_PREFIX).unwrap();
        let (details, text) = CommandDetails::decode(payload, &filter_with(&[], &[], &[])).unwrap();

        assert_eq!(details.full_command, "C:/tools/make.exe");
        assert_eq!(details.command_name, "make.exe");
        assert_eq!(text, "make.exe");
    }

    #[test]
    fn test_env_retention_and_baseline_abbreviation() {
        let payload = encode_wire_payload(
            &["make", "all"],
            &[
                ("PATH", "/shim:/usr/bin"),
                ("MAKEFLAGS", "-j4"),
                ("SECRET", "hunter2"),
            ],
            "/work",
        );
        let payload = payload.strip_prefix(wire::COMMAND_LINE_PREFIX).unwrap();
        let filter = filter_with(
            &["PATH"],
            &[("make", &["MAKEFLAGS"])],
            &[("PATH", "/usr/bin")],
        );
        let (_, text) = CommandDetails::decode(payload, &filter).unwrap();

        // SECRET is not retained; the unchanged PATH tail collapses to $PATH
        assert_eq!(text, "env 'PATH=/shim:$PATH' 'MAKEFLAGS=-j4' make all");
    }

    #[test]
    fn test_baseline_equal_value_collapses_entirely() {
        let payload = encode_wire_payload(&["ls"], &[("PATH", "/usr/bin")], "/");
        let payload = payload.strip_prefix(wire::COMMAND_LINE_PREFIX).unwrap();
        let filter = filter_with(&["PATH"], &[], &[("PATH", "/usr/bin")]);
        let (_, text) = CommandDetails::decode(payload, &filter).unwrap();

        assert_eq!(text, "env 'PATH=$PATH' ls");
    }

    #[test]
    fn test_argument_quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "\"two words\"");
        assert_eq!(quote("glob*"), "\"glob*\"");
        assert_eq!(quote("pipe|more"), "\"pipe|more\"");
        assert_eq!(quote("it's"), "\"it's\"");
        assert_eq!(quote("say \"hi\""), "'say \"hi\"'");
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        let filter = filter_with(&[], &[], &[]);
        assert!(CommandDetails::decode("no separators here", &filter).is_err());
        assert!(CommandDetails::decode(
            &format!("(){sep}(){sep}/", sep = wire::COMMAND_FIELD_SEP),
            &filter
        )
        .is_err());
        // argv entries must be strings, not numbers
        assert!(CommandDetails::decode(
            &format!("(1){sep}(){sep}/", sep = wire::COMMAND_FIELD_SEP),
            &filter
        )
        .is_err());
    }
}
