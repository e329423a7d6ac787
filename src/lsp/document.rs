//! Document tracking and path/URI mapping
//!
//! Tracks which documents were opened on a server during this session and
//! keeps their text so reference sites can be given a context line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use url::Url;

/// Tracks open documents and their text, keyed by URI
#[derive(Debug, Default)]
pub struct DocumentTracker {
    open_docs: HashMap<String, String>,
}

impl DocumentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a document is currently open
    pub fn is_open(&self, uri: &str) -> bool {
        self.open_docs.contains_key(uri)
    }

    /// Mark a document as open
    pub fn mark_open(&mut self, uri: &str, content: &str) {
        self.open_docs.insert(uri.to_string(), content.to_string());
    }

    /// Trimmed text of a 1-based line in an open document
    pub fn line(&self, uri: &str, line: u32) -> Option<String> {
        let index = usize::try_from(line.checked_sub(1)?).ok()?;
        self.open_docs
            .get(uri)?
            .lines()
            .nth(index)
            .map(|l| l.trim().to_string())
    }

    pub fn open_count(&self) -> usize {
        self.open_docs.len()
    }
}

/// Absolute form of `path`, resolved against `root` when relative
pub fn absolute_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Convert a file path to a percent-encoded file:// URI
pub fn path_to_uri(root: &Path, path: &Path) -> String {
    let absolute = absolute_path(root, path);
    match Url::from_file_path(&absolute) {
        Ok(url) => url.to_string(),
        Err(()) => format!("file://{}", absolute.display()),
    }
}

/// Extract the file path from a file:// URI
pub fn uri_to_path(uri: &str) -> PathBuf {
    if let Some(path) = Url::parse(uri).ok().and_then(|u| u.to_file_path().ok()) {
        return path;
    }
    let raw = uri.strip_prefix("file://").unwrap_or(uri);
    match urlencoding::decode(raw) {
        Ok(decoded) => PathBuf::from(decoded.into_owned()),
        Err(_) => PathBuf::from(raw),
    }
}

/// Workspace-relative path for a URI, or the absolute path when it lies outside `root`
pub fn uri_to_relative(root: &Path, uri: &str) -> String {
    let path = uri_to_path(uri);
    if let Ok(rel) = path.strip_prefix(root) {
        return rel.display().to_string();
    }
    // Servers may report the resolved form of a symlinked root
    if let Ok(canonical) = root.canonicalize() {
        if let Ok(rel) = path.strip_prefix(&canonical) {
            return rel.display().to_string();
        }
    }
    path.display().to_string()
}

/// Get language ID from file extension
pub fn language_id(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext.to_lowercase().as_str() {
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" => "cpp",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "json" => "json",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_document_lines() {
        let mut tracker = DocumentTracker::new();
        let uri = "file:///ws/math.c";

        assert!(!tracker.is_open(uri));
        tracker.mark_open(uri, "#include <stdio.h>\n\n  int add(int a, int b);\n");
        assert!(tracker.is_open(uri));
        assert_eq!(tracker.open_count(), 1);

        assert_eq!(tracker.line(uri, 3).as_deref(), Some("int add(int a, int b);"));
        assert_eq!(tracker.line(uri, 0), None);
        assert_eq!(tracker.line(uri, 99), None);
        assert_eq!(tracker.line("file:///ws/other.c", 1), None);
    }

    #[test]
    fn test_path_to_uri_encodes() {
        let root = Path::new("/ws");
        assert_eq!(path_to_uri(root, Path::new("src/main.c")), "file:///ws/src/main.c");
        assert_eq!(path_to_uri(root, Path::new("/ws/a b.c")), "file:///ws/a%20b.c");
    }

    #[test]
    fn test_uri_to_path_decodes() {
        assert_eq!(uri_to_path("file:///ws/a%20b.c"), PathBuf::from("/ws/a b.c"));
        assert_eq!(uri_to_path("/plain/path.ts"), PathBuf::from("/plain/path.ts"));
    }

    #[test]
    fn test_uri_to_relative() {
        let root = Path::new("/ws");
        assert_eq!(uri_to_relative(root, "file:///ws/src/a%20b.c"), "src/a b.c");
        assert_eq!(
            uri_to_relative(root, "file:///usr/include/stdio.h"),
            "/usr/include/stdio.h"
        );
    }

    #[test]
    fn test_language_id() {
        assert_eq!(language_id(Path::new("test.c")), "c");
        assert_eq!(language_id(Path::new("test.h")), "c");
        assert_eq!(language_id(Path::new("test.HPP")), "cpp");
        assert_eq!(language_id(Path::new("test.ts")), "typescript");
        assert_eq!(language_id(Path::new("test.tsx")), "typescriptreact");
        assert_eq!(language_id(Path::new("package.json")), "json");
        assert_eq!(language_id(Path::new("Makefile")), "plaintext");
    }
}
