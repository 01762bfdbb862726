//! Process runner configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::defaults::{
    default_inspect_command, default_inspect_host, default_inspect_port, default_interpreter,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// File to execute; targets fill this from their build entry
    #[serde(default)]
    pub file: PathBuf,

    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Extra arguments passed after the file
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub inspect: InspectOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            file: PathBuf::new(),
            interpreter: default_interpreter(),
            args: Vec::new(),
            inspect: InspectOptions::default(),
        }
    }
}

impl RunOptions {
    pub fn for_file(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }
}

/// Debugger attach settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectOptions {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_inspect_host")]
    pub host: String,

    #[serde(default = "default_inspect_port")]
    pub port: u16,

    #[serde(default = "default_inspect_command")]
    pub command: InspectCommand,

    /// Delegate the whole spawn to the `ndb` launcher instead of passing a flag
    #[serde(default)]
    pub ndb: bool,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_inspect_host(),
            port: default_inspect_port(),
            command: default_inspect_command(),
            ndb: false,
        }
    }
}

impl InspectOptions {
    /// Interpreter flag such as `--inspect=0.0.0.0:9229`.
    pub fn flag(&self) -> String {
        format!("--{}={}:{}", self.command.as_str(), self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InspectCommand {
    Inspect,
    InspectBrk,
}

impl InspectCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            InspectCommand::Inspect => "inspect",
            InspectCommand::InspectBrk => "inspect-brk",
        }
    }
}
