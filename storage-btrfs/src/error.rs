// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for BTRFS topology queries
#[derive(Error, Debug)]
pub enum BtrfsError {
    #[error("Parse error: {reason}: '{line}'")]
    Parse { line: String, reason: String },

    #[error("Malformed mount record: {reason}: '{line}'")]
    MalformedMountRecord { line: String, reason: String },

    #[error("Path '{child}' doesn't start with '{parent}'")]
    PathMismatch { parent: String, child: String },

    #[error("Failed to find a path to '{0}' through a mounted parent subvolume")]
    UnresolvableMountPath(String),

    #[error("Subvolume not found: {0}")]
    SubvolumeNotFound(String),

    #[error("No filesystem matches criteria {0}")]
    NoMatch(String),

    #[error("Found {count} filesystems matching criteria {criteria}")]
    AmbiguousMatch { count: usize, criteria: String },

    #[error("Command '{command}' exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BtrfsError {
    pub(crate) fn parse(line: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_mount(line: &str, reason: impl Into<String>) -> Self {
        Self::MalformedMountRecord {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for BTRFS topology queries
pub type Result<T> = std::result::Result<T, BtrfsError>;
