use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklane",
    version,
    about = "tasklane: terminal client for a remote personal task service",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Lifts positional `rc.key=value` / `rc.key:value` tokens out of the
/// argument list.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(rest))]
    pub fn parse(rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        let Some((first, args)) = tokens.split_first() else {
            debug!("no explicit command, listing tasks");
            return Ok(Self {
                command: "list".to_string(),
                command_args: vec![],
            });
        };

        let known = crate::commands::known_command_names();
        match crate::commands::expand_command_abbrev(first, &known) {
            Some(full) => {
                debug!(token = %first, expanded = %full, "resolved command token");
                Ok(Self {
                    command: full.to_string(),
                    command_args: args.to_vec(),
                })
            }
            None => {
                warn!(token = %first, "no command detected, treating all terms as list arguments");
                Ok(Self {
                    command: "list".to_string(),
                    command_args: tokens,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_lifted() {
        let pre = preprocess_args(&os(&[
            "tasklane",
            "rc.confirmation:off",
            "delete",
            "rc.api.url=http://x",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, os(&["tasklane", "delete"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.confirmation".to_string(), "off".to_string()),
                ("rc.api.url".to_string(), "http://x".to_string()),
            ]
        );
    }

    #[test]
    fn abbreviated_command_is_expanded() {
        let inv = Invocation::parse(os(&["tog", "6f1c"])).expect("parse");
        assert_eq!(inv.command, "toggle");
        assert_eq!(inv.command_args, vec!["6f1c".to_string()]);
    }

    #[test]
    fn unknown_leading_token_falls_back_to_list() {
        let inv = Invocation::parse(os(&["status:pending"])).expect("parse");
        assert_eq!(inv.command, "list");
        assert_eq!(inv.command_args, vec!["status:pending".to_string()]);
    }

    #[test]
    fn empty_invocation_lists_tasks() {
        let inv = Invocation::parse(vec![]).expect("parse");
        assert_eq!(inv.command, "list");
        assert!(inv.command_args.is_empty());
    }
}
