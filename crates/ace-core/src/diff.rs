//! SEARCH/REPLACE to unified diff conversion
//!
//! Some engines answer with free-form text containing SEARCH/REPLACE blocks
//! instead of a patch:
//!
//! ```text
//! src/lib.rs
//! <<<<<<< SEARCH
//! fn old() {}
//! =======
//! fn new() {}
//! >>>>>>> REPLACE
//! ```
//!
//! [`convert_to_unified_diff`] rewrites those blocks into unified-diff
//! fragments for display. Hunk positions are not tracked (every hunk header
//! is `@@ -0,0 +0,0 @@`), so the output is for visualization and is not an
//! applicable patch.
//!
//! The converter never fails: anything it cannot interpret is returned
//! verbatim.
//!
//! Filename association uses a single "current file" slot. Blocks for
//! different files interleaved without a filename line in between are
//! attributed to the most recent filename.

use crate::types::FileChange;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;

/// Opens a block and starts the search section
pub const SEARCH_OPEN: &str = "<<<<<<< SEARCH";
/// Switches from search to replace lines
pub const SEPARATOR: &str = "=======";
/// Closes a block
pub const REPLACE_CLOSE: &str = ">>>>>>> REPLACE";

/// Extensions recognized on a bare filename line
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "swift", "c", "h",
    "cc", "cpp", "hpp", "cs", "rb", "php", "scala", "sh", "css", "scss", "html", "vue", "svelte",
    "json", "yaml", "yml", "toml", "md", "sql",
];

static FILENAME_LINE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"^`?([A-Za-z0-9_\-./]+\.(?:{}))`?:?$",
        SOURCE_EXTENSIONS.join("|")
    );
    Regex::new(&pattern).expect("filename pattern is valid")
});

/// Whether text is already in unified-diff form
#[must_use]
pub fn is_unified_diff(text: &str) -> bool {
    text.contains("diff --git") || (text.contains("--- ") && text.contains("+++ "))
}

/// Extract a relative source path from a standalone filename line
#[must_use]
pub fn parse_filename_line(line: &str) -> Option<&str> {
    let captures = FILENAME_LINE.captures(line.trim())?;
    let path = captures.get(1)?.as_str();
    if path.starts_with('/') || path.split('/').any(|part| part == "..") {
        return None;
    }
    Some(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Outside,
    Search,
    Replace,
}

/// Convert engine output into unified-diff text
///
/// Returns the input unchanged when it already is a unified diff or when no
/// block could be attributed to a file.
#[must_use]
pub fn convert_to_unified_diff(output: &str) -> String {
    if is_unified_diff(output) {
        return output.to_string();
    }

    let mut converted = String::new();
    let mut current_file: Option<&str> = None;
    let mut phase = Phase::Outside;
    let mut search: Vec<&str> = Vec::new();
    let mut replace: Vec<&str> = Vec::new();
    let mut dropped = 0usize;

    for line in output.lines() {
        let marker = line.trim_end();
        match phase {
            Phase::Outside => {
                if marker == SEARCH_OPEN {
                    search.clear();
                    replace.clear();
                    phase = Phase::Search;
                } else if let Some(path) = parse_filename_line(marker) {
                    current_file = Some(path);
                }
            }
            Phase::Search => {
                if marker == SEPARATOR {
                    phase = Phase::Replace;
                } else {
                    search.push(line);
                }
            }
            Phase::Replace => {
                if marker == REPLACE_CLOSE {
                    match current_file {
                        Some(path) => write_fragment(&mut converted, path, &search, &replace),
                        None => dropped += 1,
                    }
                    phase = Phase::Outside;
                } else {
                    replace.push(line);
                }
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "search/replace blocks without a filename dropped");
    }
    if phase != Phase::Outside {
        tracing::debug!("unterminated search/replace block ignored");
    }

    if converted.is_empty() {
        output.to_string()
    } else {
        converted
    }
}

fn write_fragment(out: &mut String, path: &str, search: &[&str], replace: &[&str]) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "diff --git a/{path} b/{path}");
    let _ = writeln!(out, "--- a/{path}");
    let _ = writeln!(out, "+++ b/{path}");
    out.push_str("@@ -0,0 +0,0 @@\n");
    for line in search {
        let _ = writeln!(out, "-{line}");
    }
    for line in replace {
        let _ = writeln!(out, "+{line}");
    }
    out.push('\n');
}

/// Split unified-diff text into per-file changes
///
/// Splits at `diff --git` headers when present, otherwise at `--- ` headers
/// using the `+++` path. Text with no headers yields no changes.
#[must_use]
pub fn split_file_diffs(diff: &str) -> Vec<FileChange> {
    let git_style = diff.lines().any(|l| l.starts_with("diff --git "));
    let mut changes: Vec<FileChange> = Vec::new();

    for line in diff.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);

        let starts_file = if git_style {
            bare.starts_with("diff --git ")
        } else {
            bare.starts_with("--- ")
        };

        if starts_file {
            let path = if git_style {
                git_header_path(bare)
            } else {
                strip_side_prefix(&bare[4..])
            };
            changes.push(FileChange::new(path, String::new()));
        }

        if let Some(current) = changes.last_mut() {
            if !git_style && bare.starts_with("+++ ") {
                let new_path = strip_side_prefix(&bare[4..]);
                if new_path != "/dev/null" {
                    current.path = new_path;
                }
            }
            current.diff.push_str(line);
        }
    }

    changes
}

fn git_header_path(header: &str) -> String {
    header
        .strip_prefix("diff --git ")
        .and_then(|rest| rest.rsplit_once(" b/"))
        .map_or_else(
            || header.to_string(),
            |(_, b_path)| b_path.to_string(),
        )
}

fn strip_side_prefix(path: &str) -> String {
    // Drop a trailing timestamp (`--- a/x\t2024-01-01 ...`).
    let path = path.split('\t').next().unwrap_or(path).trim();
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn existing_git_diff_passes_through() {
        let input = "diff --git a/x.rs b/x.rs\n--- a/x.rs\n+++ b/x.rs\n@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(convert_to_unified_diff(input), input);
    }

    #[test]
    fn plain_unified_diff_passes_through() {
        let input = "--- x.py\n+++ x.py\n@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(convert_to_unified_diff(input), input);
    }

    #[test]
    fn single_block_becomes_fragment() {
        let input = "\
I updated the greeting.

src/main.rs
<<<<<<< SEARCH
fn main() {
    println!(\"hi\");
=======
fn main() {
    println!(\"hello\");
>>>>>>> REPLACE
";
        let expected = "\
diff --git a/src/main.rs b/src/main.rs
--- a/src/main.rs
+++ b/src/main.rs
@@ -0,0 +0,0 @@
-fn main() {
-    println!(\"hi\");
+fn main() {
+    println!(\"hello\");

";
        assert_eq!(convert_to_unified_diff(input), expected);
    }

    #[test]
    fn blocks_concatenate_in_encounter_order() {
        let input = "\
a.py
<<<<<<< SEARCH
x = 1
=======
x = 2
>>>>>>> REPLACE
b.ts
<<<<<<< SEARCH
let y = 1;
=======
let y = 2;
>>>>>>> REPLACE
";
        let out = convert_to_unified_diff(input);
        let a = out.find("diff --git a/a.py b/a.py").unwrap();
        let b = out.find("diff --git a/b.ts b/b.ts").unwrap();
        assert!(a < b);
        assert!(out.contains("-x = 1\n+x = 2\n"));
        assert!(out.contains("-let y = 1;\n+let y = 2;\n"));
    }

    #[test]
    fn current_file_slot_carries_over() {
        // Second block has no filename line of its own.
        let input = "\
lib.rs
<<<<<<< SEARCH
a
=======
b
>>>>>>> REPLACE
<<<<<<< SEARCH
c
=======
d
>>>>>>> REPLACE
";
        let out = convert_to_unified_diff(input);
        assert_eq!(out.matches("diff --git a/lib.rs b/lib.rs").count(), 2);
    }

    #[test]
    fn block_without_filename_is_dropped() {
        let input = "\
<<<<<<< SEARCH
a
=======
b
>>>>>>> REPLACE
main.go
<<<<<<< SEARCH
c
=======
d
>>>>>>> REPLACE
";
        let out = convert_to_unified_diff(input);
        assert_eq!(out.matches("diff --git").count(), 1);
        assert!(out.contains("a/main.go"));
        assert!(!out.contains("-a\n"));
    }

    #[test]
    fn no_blocks_returns_input() {
        let input = "I looked at the code and it is fine.\nNothing to change.";
        assert_eq!(convert_to_unified_diff(input), input);
    }

    #[test]
    fn only_unattributed_blocks_returns_input() {
        let input = "<<<<<<< SEARCH\na\n=======\nb\n>>>>>>> REPLACE\n";
        assert_eq!(convert_to_unified_diff(input), input);
    }

    #[test]
    fn unterminated_block_is_ignored() {
        let input = "x.rs\n<<<<<<< SEARCH\na\n=======\nb\n";
        assert_eq!(convert_to_unified_diff(input), input);
    }

    #[test]
    fn empty_replace_emits_only_removals() {
        let input = "x.rs\n<<<<<<< SEARCH\ndead code\n=======\n>>>>>>> REPLACE\n";
        let out = convert_to_unified_diff(input);
        assert!(out.contains("@@ -0,0 +0,0 @@\n-dead code\n\n"));
        assert!(!out
            .lines()
            .any(|l| l.starts_with('+') && !l.starts_with("+++")));
    }

    #[test]
    fn filename_line_recognition() {
        assert_eq!(parse_filename_line("src/app.tsx"), Some("src/app.tsx"));
        assert_eq!(parse_filename_line("`lib/util.py`"), Some("lib/util.py"));
        assert_eq!(parse_filename_line("pkg/main.go:"), Some("pkg/main.go"));
        assert_eq!(parse_filename_line("/etc/passwd.sh"), None);
        assert_eq!(parse_filename_line("../outside.rs"), None);
        assert_eq!(parse_filename_line("my file.rs"), None);
        assert_eq!(parse_filename_line("notes.txt"), None);
        assert_eq!(parse_filename_line("Here is src/main.rs"), None);
    }

    #[test]
    fn crlf_delimiters_are_recognized() {
        let input = "x.rs\r\n<<<<<<< SEARCH\r\na\r\n=======\r\nb\r\n>>>>>>> REPLACE\r\n";
        let out = convert_to_unified_diff(input);
        assert!(out.starts_with("diff --git a/x.rs b/x.rs\n"));
        assert!(out.contains("-a\n+b\n"));
    }

    #[test]
    fn split_git_style_diff() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -0,0 +0,0 @@
-x
+y

diff --git a/dir/b.rs b/dir/b.rs
--- a/dir/b.rs
+++ b/dir/b.rs
@@ -1 +1 @@
-p
+q
";
        let files = split_file_diffs(diff);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.rs");
        assert!(files[0].diff.starts_with("diff --git a/a.rs b/a.rs\n"));
        assert!(files[0].diff.ends_with("+y\n\n"));
        assert_eq!(files[1].path, "dir/b.rs");
        assert!(files[1].diff.ends_with("+q\n"));
    }

    #[test]
    fn split_plain_diff_uses_new_path() {
        let diff = "\
--- a/old.txt\t2024-01-01
+++ b/new.txt\t2024-01-02
@@ -1 +1 @@
-a
+b
--- a/gone.rs
+++ /dev/null
@@ -1 +0,0 @@
-bye
";
        let files = split_file_diffs(diff);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "new.txt");
        assert_eq!(files[1].path, "gone.rs");
    }

    #[test]
    fn split_without_headers_is_empty() {
        assert!(split_file_diffs("just prose").is_empty());
    }
}
