use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, INDEX_ARG_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SAVE_COMMAND,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn index_value(raw: &str) -> Value {
    raw.trim()
        .parse::<u64>()
        .map(|value| Value::Number(value.into()))
        .unwrap_or(Value::Null)
}

/// `/save [INDEX] [DIR]`: a leading integer selects a history entry, the
/// rest is the target directory.
fn parse_save_args(arg: &str) -> (Value, Value) {
    let parts = split_args(arg);
    let Some(head) = parts.first() else {
        return (Value::Null, Value::Null);
    };
    let (index, rest) = match head.parse::<u64>() {
        Ok(index) => (Value::Number(index.into()), &parts[1..]),
        Err(_) => (Value::Null, &parts[..]),
    };
    let dir = if rest.is_empty() {
        Value::Null
    } else {
        Value::String(rest.join(" "))
    };
    (index, dir)
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = &slash_tail[command_len..];
            let arg = remainder.trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let key = if action == "set_style" { "style" } else { "model" };
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert(key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, INDEX_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert("index".to_string(), index_value(arg));
                return intent;
            }

            if command == SAVE_COMMAND.command {
                let (index, dir) = parse_save_args(arg);
                let mut intent = Intent::new(SAVE_COMMAND.action, text);
                intent.command_args.insert("index".to_string(), index);
                intent.command_args.insert("dir".to_string(), dir);
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    // The form sends the text as typed; only blank input is dropped.
    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(text.trim_end_matches(['\n', '\r']).to_string());
    intent
}
