use std::ffi::{OsStr, OsString};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};

use crate::config::delete_settings_dir;
use crate::instance::HandoffRequest;

/// CustomRP - custom Discord Rich Presence
#[derive(Parser, Debug, Default)]
#[command(name = "customrp")]
#[command(about = "Custom Discord Rich Presence")]
#[command(disable_help_flag = true, args_override_self = true)]
pub struct Cli {
    /// Open as second instance
    #[arg(short = '2', long)]
    pub second_instance: bool,

    /// Import the preset without bringing the running instance to the front
    #[arg(short = 's', long)]
    pub silent_import: bool,

    /// Show this help text
    #[arg(short = '?', long)]
    pub help: bool,

    /// Preset file path(s); the last one that exists is used
    #[arg(value_name = "PRESET_FILE")]
    pub paths: Vec<PathBuf>,

    #[arg(skip)]
    first_arg: Option<OsString>,
}

pub const HELP_TEXT: &str = "\
Usage: customrp [options] [preset file path]

List of options:
-2, --second-instance: open as second instance
-s, --silent-import: silent preset import
-?, --help: shows this help text

Option(s) and file path(s) can be included in any order. Including more than one file path will result in the last valid one being used.

customrp uninstall: delete all saved settings";

impl Cli {
    /// Parse a full argv (program name first).
    ///
    /// Unknown options are dropped instead of rejected, and options may be
    /// mixed freely with file paths. A dash-prefixed argument that names an
    /// existing file is a path. Everything after `--` is a path.
    pub fn parse_lenient<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut args = args.into_iter().map(Into::into);
        let program = args.next().unwrap_or_else(|| OsString::from("customrp"));
        let rest: Vec<OsString> = args.collect();
        let first_arg = rest.first().cloned();

        let (shorts, longs) = known_flags();
        let mut flags = vec![program];
        let mut paths = Vec::new();
        let mut escaped = false;
        for arg in rest {
            if escaped {
                paths.push(arg);
                continue;
            }
            match arg.to_str() {
                Some("--") => escaped = true,
                Some(text) if text.len() > 1 && text.starts_with('-') => {
                    if is_known_flag(text, &shorts, &longs) {
                        flags.push(arg);
                    } else if Path::new(text).is_file() {
                        paths.push(arg);
                    }
                }
                _ => paths.push(arg),
            }
        }

        // Paths go behind `--` so clap never reads one as an option
        flags.push(OsString::from("--"));
        flags.extend(paths);

        let mut cli = Cli::try_parse_from(flags)?;
        cli.first_arg = first_arg;
        Ok(cli)
    }

    /// Help is only shown when asked for first
    pub fn wants_help(&self) -> bool {
        self.help
            && matches!(
                self.first_arg.as_deref().and_then(OsStr::to_str),
                Some("-?" | "--help")
            )
    }

    /// `uninstall` only counts as the very first argument
    pub fn wants_uninstall(&self) -> bool {
        self.first_arg.as_deref() == Some(OsStr::new("uninstall"))
    }

    /// Last path naming an existing file, made absolute
    pub fn preset_file(&self) -> Option<PathBuf> {
        self.paths
            .iter()
            .rev()
            .filter(|path| path.is_file())
            .find_map(|path| std::fs::canonicalize(path).ok())
    }

    pub fn handoff_request(&self) -> HandoffRequest {
        HandoffRequest {
            silent: self.silent_import,
            preset: self.preset_file(),
        }
    }
}

fn known_flags() -> (Vec<char>, Vec<String>) {
    let command = Cli::command();
    let shorts = command.get_arguments().filter_map(|a| a.get_short()).collect();
    let longs = command
        .get_arguments()
        .filter_map(|a| a.get_long())
        .map(str::to_string)
        .collect();
    (shorts, longs)
}

fn is_known_flag(arg: &str, shorts: &[char], longs: &[String]) -> bool {
    if let Some(long) = arg.strip_prefix("--") {
        return longs.iter().any(|known| known == long);
    }
    match arg.strip_prefix('-') {
        Some(cluster) if !cluster.is_empty() => cluster.chars().all(|c| shorts.contains(&c)),
        _ => false,
    }
}

/// Ask on `input` before deleting every saved setting in `settings_dir`.
/// Returns whether the user confirmed.
pub fn run_uninstall(
    settings_dir: &Path,
    mut input: impl BufRead,
    mut output: impl Write,
) -> anyhow::Result<bool> {
    write!(
        output,
        "Delete all saved settings in {}? [y/N] ",
        settings_dir.display()
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
        writeln!(output, "Nothing deleted")?;
        return Ok(false);
    }

    if delete_settings_dir(settings_dir)? {
        writeln!(output, "Settings deleted")?;
    } else {
        writeln!(output, "No saved settings found")?;
    }
    Ok(true)
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
