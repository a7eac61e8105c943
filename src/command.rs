use std::path::PathBuf;

use crate::config::SETTING_FIELDS;

/// Command typed at the primary's console
#[derive(Debug, PartialEq)]
pub enum Command {
    Connect,
    Update,
    Disconnect,
    Status,
    Show,
    Settings,
    Import(PathBuf),
    Set { field: String, value: String },
    Help,
    Quit,
    Unknown(String),
}

/// Parse one console line. Arguments keep their inner spacing.
pub fn parse_command(input: &str) -> Command {
    let input = input.trim();

    let Some(name) = input.split_whitespace().next() else {
        return Command::Unknown("Empty command".to_string());
    };
    let rest = input[name.len()..].trim_start();

    match name {
        "c" | "connect" => Command::Connect,
        "u" | "update" => Command::Update,
        "d" | "disconnect" => Command::Disconnect,
        "status" => Command::Status,
        "show" => Command::Show,
        "settings" => Command::Settings,
        "import" => {
            if rest.is_empty() {
                Command::Unknown("Usage: import <preset file>".to_string())
            } else {
                Command::Import(PathBuf::from(rest))
            }
        }
        "set" => match rest.split_once(char::is_whitespace) {
            Some((field, value)) => Command::Set {
                field: field.to_string(),
                value: value.trim_start().to_string(),
            },
            None if !rest.is_empty() => Command::Set {
                field: rest.to_string(),
                value: String::new(),
            },
            None => Command::Unknown(format!(
                "Usage: set <field> [value]; fields: {}",
                SETTING_FIELDS.join(", ")
            )),
        },
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => Command::Unknown(format!("Unknown command: {}", other)),
    }
}

pub const CONSOLE_HELP: &str = "\
Commands:
  connect | c            connect to Discord
  update | u             publish the current presence
  disconnect | d         drop the connection
  status                 show connection state
  settings               show saved settings
  set <field> [value]    change a setting (empty value clears it)
  import <file>          load a preset file
  show                   redraw this console
  help                   this list
  quit                   save and exit";
