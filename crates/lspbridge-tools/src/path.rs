//! Resolving the file paths tools receive.

use crate::error::{ToolError, ToolResult};
use crate::ToolContext;
use std::path::{Component, Path, PathBuf};

/// Resolve a path argument to an absolute, lexically normalized path.
///
/// Relative paths are tried against the context's working directory, then
/// against the workspace root. When neither exists the working-directory
/// form is returned and the caller reports the missing file.
pub fn resolve_path(raw: &str, ctx: &ToolContext) -> ToolResult<PathBuf> {
    if raw.trim().is_empty() {
        return Err(ToolError::validation("File path must not be empty"));
    }

    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return Ok(normalize(&path));
    }

    // Try relative to cwd
    let cwd_path = normalize(&ctx.cwd.join(&path));
    if cwd_path.exists() {
        return Ok(cwd_path);
    }

    // Try relative to root
    let root_path = normalize(&ctx.root_dir.join(&path));
    if root_path.exists() {
        return Ok(root_path);
    }

    Ok(cwd_path)
}

/// Path shown to the user: relative to the root when it lies inside it.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}

/// Remove `.` components and fold `..` into its parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
