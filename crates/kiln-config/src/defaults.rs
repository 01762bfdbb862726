use std::path::PathBuf;

use crate::run::InspectCommand;

pub fn default_host() -> String {
    "localhost".to_string()
}

pub fn default_port() -> u16 {
    8080
}

pub fn default_fallback() -> PathBuf {
    PathBuf::from("index.html")
}

pub fn default_exit_on_signal() -> bool {
    true
}

pub fn default_entry() -> PathBuf {
    PathBuf::from("index.js")
}

pub fn default_interpreter() -> String {
    "node".to_string()
}

pub fn default_inspect_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_inspect_port() -> u16 {
    9229
}

pub fn default_inspect_command() -> InspectCommand {
    InspectCommand::Inspect
}

pub fn default_debounce_ms() -> u64 {
    100
}

pub fn default_watch_ignore() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        ".git".to_string(),
        "*.log".to_string(),
        ".DS_Store".to_string(),
    ]
}
