//! Tool profiles and groups for access control.
//!
//! Provides a profile-based filtering mechanism so different agents can have
//! different levels of tool access.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Logical grouping of tools by capability area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolGroup {
    /// Shell execution.
    Runtime,
    /// Filesystem tools (read, write, list).
    Fs,
    /// Search and patch tools that operate across a workspace.
    Edit,
}

impl ToolGroup {
    /// Returns the tools that belong to this group.
    pub fn tools(&self) -> &'static [&'static str] {
        match self {
            ToolGroup::Runtime => &["shell"],
            ToolGroup::Fs => &["read_file", "write_file", "file_list"],
            ToolGroup::Edit => &["search_files", "patch_file"],
        }
    }

    /// Try to determine the group for a tool by name.
    pub fn from_tool_name(name: &str) -> Option<ToolGroup> {
        for group in [ToolGroup::Runtime, ToolGroup::Fs, ToolGroup::Edit] {
            if group.tools().contains(&name) {
                return Some(group);
            }
        }
        None
    }
}

/// Predefined tool access profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolProfile {
    /// Read-only tools only - safe for restricted agents.
    /// Includes: file reads and listing, no shell, no writes.
    Minimal,

    /// Development-focused tools.
    /// Includes: Runtime, Fs, Edit.
    Coding,

    /// Full access to all tools.
    #[default]
    Full,
}

impl ToolProfile {
    /// Returns the tool groups allowed by this profile.
    pub fn allowed_groups(&self) -> Vec<ToolGroup> {
        match self {
            ToolProfile::Minimal => vec![],
            ToolProfile::Coding => vec![ToolGroup::Runtime, ToolGroup::Fs, ToolGroup::Edit],
            ToolProfile::Full => vec![ToolGroup::Runtime, ToolGroup::Fs, ToolGroup::Edit],
        }
    }

    /// Returns the set of allowed tool names for this profile.
    ///
    /// Minimal gets read-only filesystem access (`read_file`, `file_list`)
    /// but not `write_file`, `shell`, or `patch_file`.
    pub fn allowed_tools(&self) -> HashSet<&'static str> {
        let mut tools: HashSet<&'static str> = self
            .allowed_groups()
            .iter()
            .flat_map(|g| g.tools().iter().copied())
            .collect();

        if *self == ToolProfile::Minimal {
            tools.insert("read_file");
            tools.insert("file_list");
        }

        tools
    }

    /// Check if a tool name is allowed by this profile.
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        // If the tool isn't in any known group, allow it by default
        // (backwards compatibility for custom tools)
        if ToolGroup::from_tool_name(tool_name).is_none() {
            return true;
        }
        self.allowed_tools().contains(tool_name)
    }

    /// Returns a human-readable description of this profile.
    pub fn description(&self) -> &'static str {
        match self {
            ToolProfile::Minimal => "Minimal access: read-only filesystem access only",
            ToolProfile::Coding => "Development access: shell, filesystem, and search/patch tools",
            ToolProfile::Full => "Full access: all available tools",
        }
    }

    /// Returns all available profiles.
    pub fn all() -> &'static [ToolProfile] {
        &[ToolProfile::Minimal, ToolProfile::Coding, ToolProfile::Full]
    }
}

impl std::fmt::Display for ToolProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolProfile::Minimal => write!(f, "minimal"),
            ToolProfile::Coding => write!(f, "coding"),
            ToolProfile::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for ToolProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(ToolProfile::Minimal),
            "coding" => Ok(ToolProfile::Coding),
            "full" => Ok(ToolProfile::Full),
            _ => Err(format!(
                "Unknown tool profile: {}. Valid options: minimal, coding, full",
                s
            )),
        }
    }
}

impl std::fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolGroup::Runtime => write!(f, "runtime"),
            ToolGroup::Fs => write!(f, "fs"),
            ToolGroup::Edit => write!(f, "edit"),
        }
    }
}

impl std::str::FromStr for ToolGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "runtime" => Ok(ToolGroup::Runtime),
            "fs" => Ok(ToolGroup::Fs),
            "edit" => Ok(ToolGroup::Edit),
            _ => Err(format!(
                "Unknown tool group: {}. Valid options: runtime, fs, edit",
                s
            )),
        }
    }
}
