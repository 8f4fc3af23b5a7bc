// SPDX-License-Identifier: MIT OR Apache-2.0
//! Working-directory containment: defeat symlink escape by comparing
//! realpaths rather than the literal supplied path.

use std::path::{Path, PathBuf};

use ak_error::{AkError, ErrorCode};

/// Resolve `candidate` and confirm it is the workspace root or a
/// descendant of it, after both sides are canonicalized.
pub fn contain_cwd(candidate: &Path, workspace_root: &Path) -> Result<PathBuf, AkError> {
    let real_root = std::fs::canonicalize(workspace_root).map_err(|e| {
        AkError::new(ErrorCode::FilesystemEscape, "workspace root does not resolve")
            .with_context("root", workspace_root.display().to_string())
            .with_source(e)
    })?;
    let real_candidate = std::fs::canonicalize(candidate).map_err(|e| {
        AkError::new(ErrorCode::FilesystemEscape, "cwd does not resolve to an existing directory")
            .with_context("cwd", candidate.display().to_string())
            .with_source(e)
    })?;

    if !real_candidate.is_dir() {
        return Err(AkError::new(ErrorCode::FilesystemEscape, "cwd is not a directory")
            .with_context("cwd", real_candidate.display().to_string()));
    }

    if real_candidate == real_root || real_candidate.starts_with(&real_root) {
        Ok(real_candidate)
    } else {
        Err(AkError::new(ErrorCode::FilesystemEscape, "cwd escapes the workspace root")
            .with_context("cwd", real_candidate.display().to_string())
            .with_context("root", real_root.display().to_string()))
    }
}
