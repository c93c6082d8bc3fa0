//! SFTP browsing
//!
//! Directory listing, navigation and entry mutation on top of the shell
//! backend. SFTP operations are never retried automatically; failures are
//! surfaced inline next to the operation and require explicit user retry.

pub mod browser;
pub mod drag;
pub mod path_utils;

pub use browser::{SftpBrowser, LIST_TIMEOUT};
pub use drag::DragCounter;

use serde::{Deserialize, Serialize};

/// SFTP operation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum SftpError {
    #[error("Listing timed out after {0}s")]
    ListTimeout(u64),

    #[error("{0}")]
    Backend(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid mode: {0}")]
    InvalidMode(String),
}

/// One entry of a directory listing snapshot.
///
/// Snapshots are replaced wholesale on every navigation/refresh, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SftpEntry {
    /// Entry name (not full path)
    pub name: String,
    pub is_dir: bool,
    /// Size in bytes, if the server reported one
    #[serde(default)]
    pub size: Option<u64>,
    /// Permissions as an octal string (e.g. "755"), if reported
    #[serde(default)]
    pub perm: Option<String>,
}

impl SftpEntry {
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: None,
            perm: None,
        }
    }

    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size: Some(size),
            perm: None,
        }
    }
}

/// Validate a user-supplied entry name before any backend call.
///
/// Names must be non-empty and must not contain a path separator; anything
/// else is rejected locally with zero side effects.
pub fn validate_entry_name(name: &str) -> Result<(), SftpError> {
    if name.trim().is_empty() {
        return Err(SftpError::InvalidName("name must not be empty".into()));
    }
    if name.contains('/') {
        return Err(SftpError::InvalidName(format!(
            "name must not contain '/': {}",
            name
        )));
    }
    Ok(())
}

/// Parse a chmod mode string: 3-4 octal digits (e.g. "644", "0755").
pub fn parse_octal_mode(mode: &str) -> Result<u32, SftpError> {
    let valid_len = mode.len() == 3 || mode.len() == 4;
    if !valid_len || !mode.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return Err(SftpError::InvalidMode(format!(
            "expected 3-4 octal digits, got {:?}",
            mode
        )));
    }
    u32::from_str_radix(mode, 8)
        .map_err(|e| SftpError::InvalidMode(format!("{}: {}", mode, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_entry_name() {
        assert!(validate_entry_name("notes.txt").is_ok());
        assert!(validate_entry_name(".bashrc").is_ok());

        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("   ").is_err());
        assert!(validate_entry_name("a/b").is_err());
        assert!(validate_entry_name("/etc").is_err());
    }

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(parse_octal_mode("644").unwrap(), 0o644);
        assert_eq!(parse_octal_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_octal_mode("7777").unwrap(), 0o7777);

        assert!(parse_octal_mode("").is_err());
        assert!(parse_octal_mode("64").is_err());
        assert!(parse_octal_mode("00644").is_err());
        assert!(parse_octal_mode("648").is_err());
        assert!(parse_octal_mode("rwx").is_err());
    }
}
