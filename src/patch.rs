//! Unified diff rendering for generated edits.

use similar::TextDiff;

/// Render a unified diff between old and new file content, using
/// `a/{filename}` / `b/{filename}` headers. Returns an empty string when
/// nothing changed.
pub fn generate_patch(old_code: &str, new_code: &str, filename: &str) -> String {
    if old_code == new_code {
        return String::new();
    }

    TextDiff::from_lines(old_code, new_code)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{filename}"), &format!("b/{filename}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_contains_headers_and_hunks() {
        let old = "fn main() {\n    println!(\"old\");\n}\n";
        let new = "fn main() {\n    println!(\"new\");\n}\n";
        let patch = generate_patch(old, new, "src/main.rs");

        assert!(patch.contains("--- a/src/main.rs"));
        assert!(patch.contains("+++ b/src/main.rs"));
        assert!(patch.contains("-    println!(\"old\");"));
        assert!(patch.contains("+    println!(\"new\");"));
    }

    #[test]
    fn test_patch_identical_content_is_empty() {
        let code = "unchanged\n";
        assert_eq!(generate_patch(code, code, "file.txt"), "");
    }
}
