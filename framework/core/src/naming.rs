use std::path::{Path, PathBuf};

use anyhow::Context;

/// Extension shared by every per-node file written into the log directory.
pub const NODE_FILE_EXTENSION: &str = ".txt";
/// Directory, relative to the log directory, that nodes write their artifacts into.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// The kinds of per-node file that the process wrapper writes into the shared log directory.
///
/// A node file name is `<prefix><index><extension>`, for example `marker-file-3.txt`. The index is
/// the position of the node's container in the pod spec and must be a plain decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFileKind {
    /// Created once the wrapped process exits. Contains the decimal exit code.
    Marker,
    /// Continuously appended with the wrapped process' output.
    ProcessLog,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NodeFileError {
    #[error("File name {0:?} does not start with {1:?}")]
    WrongPrefix(String, &'static str),
    #[error("File name {0:?} does not end with \".txt\"")]
    WrongExtension(String),
    #[error("File name {0:?} does not carry a valid node index")]
    InvalidIndex(String),
}

impl NodeFileKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            NodeFileKind::Marker => "marker-file-",
            NodeFileKind::ProcessLog => "process-log-",
        }
    }

    pub fn file_name(&self, index: usize) -> String {
        format!("{}{index}{NODE_FILE_EXTENSION}", self.prefix())
    }

    pub fn path_in(&self, dir: impl AsRef<Path>, index: usize) -> PathBuf {
        dir.as_ref().join(self.file_name(index))
    }

    /// Parse the node index out of a file name (or path, only the final component is considered).
    pub fn parse(&self, name: impl AsRef<Path>) -> Result<usize, NodeFileError> {
        let name = name
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let rest = name
            .strip_prefix(self.prefix())
            .ok_or_else(|| NodeFileError::WrongPrefix(name.clone(), self.prefix()))?;
        let digits = rest
            .strip_suffix(NODE_FILE_EXTENSION)
            .ok_or_else(|| NodeFileError::WrongExtension(name.clone()))?;

        // `usize::from_str` accepts a leading '+', which is not part of the convention.
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NodeFileError::InvalidIndex(name));
        }

        digits
            .parse::<usize>()
            .map_err(|_| NodeFileError::InvalidIndex(name))
    }
}

/// List the node files of the given kind directly inside `dir`, sorted by node index.
///
/// Subdirectories are not descended into and names which do not follow the convention are skipped.
pub fn node_files(dir: impl AsRef<Path>, kind: NodeFileKind) -> anyhow::Result<Vec<(usize, PathBuf)>> {
    let dir = dir.as_ref();
    let mut found = Vec::new();

    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        match kind.parse(entry.file_name()) {
            Ok(index) => found.push((index, entry.into_path())),
            Err(NodeFileError::WrongPrefix(..)) => {}
            Err(e) => log::debug!("Skipping {}: {e}", entry.path().display()),
        }
    }

    found.sort();
    Ok(found)
}
