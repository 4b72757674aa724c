//! candidates/tools.rs
//! External tools the race can use, and which of them were found.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{locate_executable, RaceConfig};
use crate::constants::tool_names;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Gzip,
    Pigz,
    SevenZip,
    Zopfli,
    Advdef,
    Python,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Gzip,
        Tool::Pigz,
        Tool::SevenZip,
        Tool::Zopfli,
        Tool::Advdef,
        Tool::Python,
    ];

    /// Executable name, also the configuration key of its override.
    pub fn name(self) -> &'static str {
        match self {
            Tool::Gzip => tool_names::GZIP,
            Tool::Pigz => tool_names::PIGZ,
            Tool::SevenZip => tool_names::SEVEN_ZIP,
            Tool::Zopfli => tool_names::ZOPFLI,
            Tool::Advdef => tool_names::ADVDEF,
            Tool::Python => tool_names::PYTHON,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved executable paths. A missing tool simply has no entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolSet {
    paths: BTreeMap<Tool, PathBuf>,
}

impl ToolSet {
    /// No external tools: only in-process candidates will run.
    pub fn none() -> Self {
        Self::default()
    }

    /// Probe every known tool, honouring configured overrides.
    pub fn discover(config: &RaceConfig) -> Self {
        let mut set = Self::none();
        for tool in Tool::ALL {
            if let Some(path) = locate_executable(tool.name(), config.tool_override(tool.name())) {
                set.paths.insert(tool, path);
            }
        }
        info!(
            target: "ultragz::candidate",
            found = ?set.paths.keys().map(|t| t.name()).collect::<Vec<_>>(),
            "external tools discovered"
        );
        set
    }

    pub fn with(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(tool, path.into());
        self
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.paths.get(&tool).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}
