//! Sandboxed file-operation executor.
//!
//! Paths resolve against a workspace root and must stay prefix-contained in
//! one of the allowed roots (unless containment is explicitly disabled for
//! development).  Resolution is lexical: `..` components are folded before
//! the containment check, so a path cannot escape by traversal.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::ToolExecutor;

/// Default byte cap for `read_file`.
const DEFAULT_READ_MAX_BYTES: u64 = 1024 * 1024;

/// Tool outcome: both sides are JSON values; `Err` carries `{"error": ...}`.
type ToolResult = Result<Value, Value>;

/// File tools rooted in a workspace directory.
pub struct FsToolExecutor {
    workspace_root: PathBuf,
    /// Roots a resolved path may live under (includes the workspace root).
    allowed_roots: Vec<PathBuf>,
    /// Disables containment entirely. Development only.
    allow_all_paths: bool,
}

impl FsToolExecutor {
    pub fn new(workspace_root: PathBuf, extra_roots: Vec<PathBuf>, allow_all_paths: bool) -> Self {
        let mut allowed_roots = vec![normalize(&workspace_root)];
        allowed_roots.extend(extra_roots.iter().map(|r| normalize(r)));
        Self {
            workspace_root,
            allowed_roots,
            allow_all_paths,
        }
    }

    /// Build from `PI_WORKSPACE_ROOT`, `PI_ALLOWED_ROOTS` (colon-separated)
    /// and `PI_ALLOW_ALL_PATHS`.  The workspace root defaults to the user's
    /// documents directory.
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("PI_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_workspace_root());
        let extra_roots = std::env::var("PI_ALLOWED_ROOTS")
            .map(|v| {
                v.split(':')
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        let allow_all = std::env::var("PI_ALLOW_ALL_PATHS")
            .map(|v| v == "1")
            .unwrap_or(false);
        Self::new(workspace_root, extra_roots, allow_all)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Expand `~`, resolve relative paths against the workspace root, fold
    /// `.`/`..` components.
    fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = if raw == "~" || raw.starts_with("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(raw.trim_start_matches('~').trim_start_matches('/')),
                None => PathBuf::from(raw),
            }
        } else {
            PathBuf::from(raw)
        };
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            self.workspace_root.join(expanded)
        };
        normalize(&absolute)
    }

    /// Resolve and containment-check the named path argument.
    fn authorize(&self, args: &Value, key: &str) -> Result<PathBuf, Value> {
        let raw = require_str(args, key)?;
        let resolved = self.resolve(&raw);
        if self.allow_all_paths
            || self
                .allowed_roots
                .iter()
                .any(|root| resolved.starts_with(root))
        {
            Ok(resolved)
        } else {
            Err(err_value(format!(
                "path is outside the allowed roots: {}",
                resolved.display()
            )))
        }
    }

    async fn read_file(&self, args: &Value) -> ToolResult {
        let path = self.authorize(args, "path")?;
        let max_bytes = args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_READ_MAX_BYTES) as usize;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| err_value(format!("read failed: {e}")))?;
        let size = bytes.len();
        let truncated = size > max_bytes;
        let content = String::from_utf8_lossy(&bytes[..size.min(max_bytes)]).into_owned();
        Ok(json!({
            "path": path.display().to_string(),
            "content": content,
            "size": size,
            "truncated": truncated,
        }))
    }

    async fn write_file(&self, args: &Value) -> ToolResult {
        let path = self.authorize(args, "path")?;
        let content = require_str(args, "content")?;
        let created = !path.exists();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| err_value(format!("create parent failed: {e}")))?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| err_value(format!("write failed: {e}")))?;
        Ok(json!({
            "path": path.display().to_string(),
            "bytes_written": content.len(),
            "created": created,
        }))
    }

    async fn edit_file(&self, args: &Value) -> ToolResult {
        let path = self.authorize(args, "path")?;
        let new_text = require_str(args, "new_text")?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| err_value(format!("read failed: {e}")))?;

        let (edited, success, message, changes) = if let Some(old_text) =
            args.get("old_text").and_then(Value::as_str)
        {
            let count = content.matches(old_text).count();
            if count == 0 {
                (content, false, "old_text not found".to_owned(), 0)
            } else {
                (
                    content.replace(old_text, &new_text),
                    true,
                    format!("replaced {count} occurrence(s)"),
                    count,
                )
            }
        } else if let Some(line_number) = args.get("line_number").and_then(Value::as_u64) {
            let mut lines: Vec<&str> = content.lines().collect();
            let idx = line_number as usize;
            if idx == 0 || idx > lines.len() {
                (
                    content.clone(),
                    false,
                    format!(
                        "line_number {idx} out of range (file has {} lines)",
                        lines.len()
                    ),
                    0,
                )
            } else {
                lines[idx - 1] = &new_text;
                let mut joined = lines.join("\n");
                if content.ends_with('\n') {
                    joined.push('\n');
                }
                (joined, true, format!("replaced line {idx}"), 1)
            }
        } else {
            return Err(err_value("edit_file requires old_text or line_number"));
        };

        if success {
            tokio::fs::write(&path, edited)
                .await
                .map_err(|e| err_value(format!("write failed: {e}")))?;
        }
        Ok(json!({
            "path": path.display().to_string(),
            "success": success,
            "message": message,
            "changes_count": changes,
        }))
    }

    async fn delete_file(&self, args: &Value) -> ToolResult {
        let path = self.authorize(args, "path")?;
        let recursive = args
            .get("recursive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| err_value(format!("stat failed: {e}")))?;
        let was_directory = meta.is_dir();
        let result = if was_directory {
            if recursive {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_dir(&path).await
            }
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| err_value(format!("delete failed: {e}")))?;
        Ok(json!({
            "path": path.display().to_string(),
            "deleted": true,
            "was_directory": was_directory,
        }))
    }

    async fn transfer(&self, args: &Value, copy: bool) -> ToolResult {
        let source = self.authorize(args, "source_path")?;
        let dest = self.authorize(args, "destination_path")?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| err_value(format!("create parent failed: {e}")))?;
        }
        let result = if copy {
            tokio::fs::copy(&source, &dest).await.map(|_| ())
        } else {
            tokio::fs::rename(&source, &dest).await
        };
        result.map_err(|e| {
            err_value(format!("{} failed: {e}", if copy { "copy" } else { "move" }))
        })?;
        Ok(json!({
            "source_path": source.display().to_string(),
            "destination_path": dest.display().to_string(),
            "success": true,
        }))
    }

    async fn list_directory(&self, args: &Value) -> ToolResult {
        let root = self.authorize(args, "path")?;
        let recursive = args
            .get("recursive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let include_hidden = args
            .get("include_hidden")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut items = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| err_value(format!("list failed: {e}")))?;
            loop {
                let entry = entries
                    .next_entry()
                    .await
                    .map_err(|e| err_value(format!("list failed: {e}")))?;
                let Some(entry) = entry else { break };
                let name = entry.file_name().to_string_lossy().into_owned();
                if !include_hidden && name.starts_with('.') {
                    continue;
                }
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| err_value(format!("stat failed: {e}")))?;
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .map(|p| p.display().to_string())
                    .unwrap_or(name);
                if meta.is_dir() && recursive {
                    pending.push(entry.path());
                }
                items.push(json!({
                    "name": rel,
                    "is_directory": meta.is_dir(),
                    "size": meta.len(),
                }));
            }
        }
        items.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(json!({
            "path": root.display().to_string(),
            "count": items.len(),
            "items": items,
        }))
    }

    async fn create_directory(&self, args: &Value) -> ToolResult {
        let path = self.authorize(args, "path")?;
        let already_exists = path.is_dir();
        if !already_exists {
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| err_value(format!("create failed: {e}")))?;
        }
        Ok(json!({
            "path": path.display().to_string(),
            "created": !already_exists,
            "already_exists": already_exists,
        }))
    }

    async fn check_path(&self, args: &Value) -> ToolResult {
        let path = self.authorize(args, "path")?;
        Ok(match tokio::fs::metadata(&path).await {
            Ok(meta) => json!({
                "path": path.display().to_string(),
                "exists": true,
                "is_directory": meta.is_dir(),
                "is_file": meta.is_file(),
                "size": meta.len(),
            }),
            Err(_) => json!({
                "path": path.display().to_string(),
                "exists": false,
                "is_directory": false,
                "is_file": false,
            }),
        })
    }
}

#[async_trait]
impl ToolExecutor for FsToolExecutor {
    async fn execute(&self, name: &str, arguments: &Value) -> Value {
        debug!(tool = %name, "executing file tool");
        let result = match name {
            "read_file" => self.read_file(arguments).await,
            "write_file" => self.write_file(arguments).await,
            "edit_file" => self.edit_file(arguments).await,
            "delete_file" => self.delete_file(arguments).await,
            "move_file" => self.transfer(arguments, false).await,
            "copy_file" => self.transfer(arguments, true).await,
            "list_directory" => self.list_directory(arguments).await,
            "create_directory" => self.create_directory(arguments).await,
            "check_path" => self.check_path(arguments).await,
            other => Err(err_value(format!("unknown tool: {other}"))),
        };
        result.unwrap_or_else(|e| e)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn default_workspace_root() -> PathBuf {
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn err_value(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// Extract a required string argument.
fn require_str(args: &Value, key: &str) -> Result<String, Value> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| err_value(format!("missing required argument: {key}")))
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, FsToolExecutor) {
        let dir = tempfile::tempdir().expect("tempdir");
        let exec = FsToolExecutor::new(dir.path().to_path_buf(), Vec::new(), false);
        (dir, exec)
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (_dir, exec) = sandbox();
        let written = exec
            .execute("write_file", &json!({ "path": "notes.txt", "content": "hello" }))
            .await;
        assert_eq!(written["bytes_written"], 5);
        assert_eq!(written["created"], true);

        let read = exec.execute("read_file", &json!({ "path": "notes.txt" })).await;
        assert_eq!(read["content"], "hello");
        assert_eq!(read["size"], 5);
        assert_eq!(read["truncated"], false);
    }

    #[tokio::test]
    async fn read_respects_max_bytes() {
        let (_dir, exec) = sandbox();
        exec.execute("write_file", &json!({ "path": "big.txt", "content": "abcdefgh" }))
            .await;
        let read = exec
            .execute("read_file", &json!({ "path": "big.txt", "max_bytes": 4 }))
            .await;
        assert_eq!(read["content"], "abcd");
        assert_eq!(read["size"], 8);
        assert_eq!(read["truncated"], true);
    }

    #[tokio::test]
    async fn edit_by_old_text_replaces_every_occurrence() {
        let (_dir, exec) = sandbox();
        exec.execute("write_file", &json!({ "path": "f.txt", "content": "a b a" }))
            .await;
        let edited = exec
            .execute(
                "edit_file",
                &json!({ "path": "f.txt", "old_text": "a", "new_text": "z" }),
            )
            .await;
        assert_eq!(edited["success"], true);
        assert_eq!(edited["changes_count"], 2);

        let read = exec.execute("read_file", &json!({ "path": "f.txt" })).await;
        assert_eq!(read["content"], "z b z");
    }

    #[tokio::test]
    async fn edit_by_line_number_replaces_one_line() {
        let (_dir, exec) = sandbox();
        exec.execute(
            "write_file",
            &json!({ "path": "f.txt", "content": "one\ntwo\nthree\n" }),
        )
        .await;
        let edited = exec
            .execute(
                "edit_file",
                &json!({ "path": "f.txt", "line_number": 2, "new_text": "TWO" }),
            )
            .await;
        assert_eq!(edited["success"], true);
        assert_eq!(edited["changes_count"], 1);

        let read = exec.execute("read_file", &json!({ "path": "f.txt" })).await;
        assert_eq!(read["content"], "one\nTWO\nthree\n");
    }

    #[tokio::test]
    async fn edit_missing_old_text_reports_failure_without_writing() {
        let (_dir, exec) = sandbox();
        exec.execute("write_file", &json!({ "path": "f.txt", "content": "abc" }))
            .await;
        let edited = exec
            .execute(
                "edit_file",
                &json!({ "path": "f.txt", "old_text": "zzz", "new_text": "y" }),
            )
            .await;
        assert_eq!(edited["success"], false);
        assert_eq!(edited["changes_count"], 0);
    }

    #[tokio::test]
    async fn move_and_copy_report_both_paths() {
        let (_dir, exec) = sandbox();
        exec.execute("write_file", &json!({ "path": "a.txt", "content": "x" }))
            .await;
        let copied = exec
            .execute(
                "copy_file",
                &json!({ "source_path": "a.txt", "destination_path": "b.txt" }),
            )
            .await;
        assert_eq!(copied["success"], true);

        let moved = exec
            .execute(
                "move_file",
                &json!({ "source_path": "b.txt", "destination_path": "c.txt" }),
            )
            .await;
        assert_eq!(moved["success"], true);
        let check = exec.execute("check_path", &json!({ "path": "b.txt" })).await;
        assert_eq!(check["exists"], false);
    }

    #[tokio::test]
    async fn list_directory_counts_entries_and_skips_hidden() {
        let (_dir, exec) = sandbox();
        exec.execute("write_file", &json!({ "path": "one.txt", "content": "1" }))
            .await;
        exec.execute("write_file", &json!({ "path": ".hidden", "content": "h" }))
            .await;
        exec.execute("create_directory", &json!({ "path": "sub" })).await;

        let listed = exec.execute("list_directory", &json!({ "path": "." })).await;
        assert_eq!(listed["count"], 2);

        let with_hidden = exec
            .execute(
                "list_directory",
                &json!({ "path": ".", "include_hidden": true }),
            )
            .await;
        assert_eq!(with_hidden["count"], 3);
    }

    #[tokio::test]
    async fn delete_directory_requires_recursive_when_non_empty() {
        let (_dir, exec) = sandbox();
        exec.execute("write_file", &json!({ "path": "d/f.txt", "content": "x" }))
            .await;
        let refused = exec.execute("delete_file", &json!({ "path": "d" })).await;
        assert!(refused["error"].is_string());

        let deleted = exec
            .execute("delete_file", &json!({ "path": "d", "recursive": true }))
            .await;
        assert_eq!(deleted["deleted"], true);
        assert_eq!(deleted["was_directory"], true);
    }

    #[tokio::test]
    async fn paths_outside_allowed_roots_are_refused_as_error_values() {
        let (_dir, exec) = sandbox();
        let outside = tempfile::tempdir().expect("tempdir");
        let target = outside.path().join("secret.txt");
        std::fs::write(&target, "secret").expect("seed file");

        let result = exec
            .execute("read_file", &json!({ "path": target.display().to_string() }))
            .await;
        assert!(
            result["error"]
                .as_str()
                .unwrap_or("")
                .contains("outside the allowed roots"),
            "expected containment error, got {result}"
        );
    }

    #[tokio::test]
    async fn traversal_cannot_escape_the_workspace() {
        let (_dir, exec) = sandbox();
        let result = exec
            .execute("read_file", &json!({ "path": "../../etc/hosts" }))
            .await;
        assert!(result["error"].is_string());
    }

    #[tokio::test]
    async fn allow_all_paths_skips_containment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exec = FsToolExecutor::new(dir.path().to_path_buf(), Vec::new(), true);
        let outside = tempfile::tempdir().expect("tempdir");
        let target = outside.path().join("open.txt");
        std::fs::write(&target, "ok").expect("seed file");

        let result = exec
            .execute("read_file", &json!({ "path": target.display().to_string() }))
            .await;
        assert_eq!(result["content"], "ok");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_value() {
        let (_dir, exec) = sandbox();
        let result = exec.execute("format_disk", &json!({})).await;
        assert_eq!(result["error"], "unknown tool: format_disk");
    }
}
