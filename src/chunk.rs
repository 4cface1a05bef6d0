//! Code chunking strategies.
//!
//! Splits a source file into semantically coherent chunks for embedding
//! and retrieval. Three strategies are tried in order, first non-empty
//! result wins:
//!
//! 1. Syntax-aware chunking for Python via tree-sitter (functions,
//!    classes, and a module preamble).
//! 2. Heuristic boundary chunking for JavaScript/TypeScript via ordered
//!    declaration patterns.
//! 3. Fixed line windows with overlap for everything else.
//!
//! Chunking never fails: a file that defeats every parser still comes
//! back as whole-file or windowed chunks.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::config::ChunkingConfig;
use crate::models::CodeChunk;

/// One chunking strategy. Returns `None` when the strategy does not apply
/// to the file's language or could not find any structure; the caller
/// then falls through to the next strategy in the chain.
trait ChunkStrategy: Send + Sync {
    fn attempt(&self, file_path: &str, content: &str, language: &str) -> Option<Vec<CodeChunk>>;
}

/// Ordered chain of chunking strategies.
pub struct Chunker {
    strategies: Vec<Box<dyn ChunkStrategy>>,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            strategies: vec![
                Box::new(PythonAstStrategy {
                    max_chunk_lines: config.max_chunk_lines,
                }),
                Box::new(JsBoundaryStrategy),
                Box::new(LineWindowStrategy {
                    max_chunk_lines: config.max_chunk_lines,
                    window_lines: config.window_lines,
                    overlap_lines: config.overlap_lines,
                }),
            ],
        }
    }

    /// Chunk a file into logical code blocks. Never errors; an empty file
    /// yields an empty list, everything else yields at least one chunk.
    pub fn chunk_file(&self, file_path: &str, content: &str, language: &str) -> Vec<CodeChunk> {
        for strategy in &self.strategies {
            if let Some(chunks) = strategy.attempt(file_path, content, language) {
                if !chunks.is_empty() {
                    debug!(file_path, count = chunks.len(), "chunked");
                    return chunks;
                }
            }
        }
        Vec::new()
    }
}

/// Join `lines[start..=end]` (1-based, inclusive), clamped to the file.
fn slice_lines(lines: &[&str], start: usize, end: usize) -> String {
    let end = end.min(lines.len());
    if start == 0 || start > end {
        return String::new();
    }
    lines[start - 1..end].join("\n")
}

// ============ Strategy 1: Python via tree-sitter ============

struct PythonAstStrategy {
    max_chunk_lines: usize,
}

/// Resolve a top-level node to `(outer, definition)` where `outer` spans
/// the full source range (decorators included) and `definition` is the
/// `function_definition`/`class_definition` node itself.
fn definition_of(node: Node<'_>) -> Option<(Node<'_>, Node<'_>)> {
    match node.kind() {
        "function_definition" | "class_definition" => Some((node, node)),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .map(|def| (node, def)),
        _ => None,
    }
}

fn node_name(def: Node<'_>, source: &str) -> String {
    def.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .unwrap_or("<anonymous>")
        .to_string()
}

impl ChunkStrategy for PythonAstStrategy {
    fn attempt(&self, file_path: &str, content: &str, language: &str) -> Option<Vec<CodeChunk>> {
        if language != "python" {
            return None;
        }

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .ok()?;
        let tree = parser.parse(content, None)?;
        let root = tree.root_node();
        if root.has_error() {
            debug!(file_path, "python parse failed, falling through");
            return None;
        }

        let lines: Vec<&str> = content.lines().collect();
        let mut cursor = root.walk();
        let defs: Vec<(Node, Node)> = root
            .named_children(&mut cursor)
            .filter_map(definition_of)
            .collect();

        let mut chunks = Vec::new();

        // Module docstring / imports before the first definition.
        if let Some((outer, _)) = defs.first() {
            let first_line = outer.start_position().row + 1;
            if first_line > 1 {
                let preamble = slice_lines(&lines, 1, first_line - 1);
                let preamble = preamble.trim();
                if !preamble.is_empty() && preamble.lines().count() >= 3 {
                    chunks.push(CodeChunk {
                        file_path: file_path.to_string(),
                        symbol: "<module>".to_string(),
                        code: preamble.to_string(),
                        language: "python".to_string(),
                        start_line: 1,
                        end_line: (first_line - 1) as u32,
                    });
                }
            }
        }

        for (outer, def) in &defs {
            let start = outer.start_position().row + 1;
            let end = (outer.end_position().row + 1).min(lines.len());

            match def.kind() {
                "function_definition" => {
                    chunks.push(CodeChunk {
                        file_path: file_path.to_string(),
                        symbol: node_name(*def, content),
                        code: slice_lines(&lines, start, end),
                        language: "python".to_string(),
                        start_line: start as u32,
                        end_line: end as u32,
                    });
                }
                "class_definition" => {
                    let name = node_name(*def, content);

                    // Small classes stay whole; large ones split into a
                    // header chunk plus one chunk per method.
                    if end - start <= self.max_chunk_lines {
                        chunks.push(CodeChunk {
                            file_path: file_path.to_string(),
                            symbol: name,
                            code: slice_lines(&lines, start, end),
                            language: "python".to_string(),
                            start_line: start as u32,
                            end_line: end as u32,
                        });
                        continue;
                    }

                    let methods = class_methods(*def);

                    let header_end = methods
                        .first()
                        .map(|(m_outer, _)| m_outer.start_position().row)
                        .unwrap_or(start);
                    let header = slice_lines(&lines, start, header_end);
                    if !header.trim().is_empty() {
                        chunks.push(CodeChunk {
                            file_path: file_path.to_string(),
                            symbol: format!("{name}.<header>"),
                            code: header,
                            language: "python".to_string(),
                            start_line: start as u32,
                            end_line: header_end as u32,
                        });
                    }

                    for (m_outer, m_def) in methods {
                        let m_start = m_outer.start_position().row + 1;
                        let m_end = (m_outer.end_position().row + 1).min(lines.len());
                        chunks.push(CodeChunk {
                            file_path: file_path.to_string(),
                            symbol: format!("{name}.{}", node_name(m_def, content)),
                            code: slice_lines(&lines, m_start, m_end),
                            language: "python".to_string(),
                            start_line: m_start as u32,
                            end_line: m_end as u32,
                        });
                    }
                }
                _ => {}
            }
        }

        Some(chunks)
    }
}

/// Methods of a class body, decorated ones included.
fn class_methods(class_def: Node<'_>) -> Vec<(Node<'_>, Node<'_>)> {
    let Some(body) = class_def.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut cursor = body.walk();
    body.named_children(&mut cursor)
        .filter_map(definition_of)
        .filter(|(_, def)| def.kind() == "function_definition")
        .collect()
}

// ============ Strategy 2: JS/TS declaration boundaries ============

/// Boundary patterns tried per line. Order encodes priority — the first
/// matching pattern wins, so exported declarations are classified before
/// their plain counterparts.
static BOUNDARY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^export\s+(?:default\s+)?(?:async\s+)?function\s+\w+",
        r"^(?:async\s+)?function\s+\w+",
        r"^(?:export\s+)?(?:const|let|var)\s+\w+\s*=\s*(?:async\s+)?(?:\([^)]*\)|[^=])\s*=>",
        r"^(?:export\s+(?:default\s+)?)?class\s+\w+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static boundary pattern"))
    .collect()
});

static SYMBOL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?:export\s+(?:default\s+)?)?(?:async\s+)?function\s+(\w+)",
        r"(?:export\s+)?(?:const|let|var)\s+(\w+)",
        r"(?:export\s+(?:default\s+)?)?class\s+(\w+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static symbol pattern"))
    .collect()
});

fn extract_js_symbol(line: &str) -> String {
    for pattern in SYMBOL_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(line) {
            if let Some(name) = captures.get(1) {
                return name.as_str().to_string();
            }
        }
    }
    "<anonymous>".to_string()
}

struct JsBoundaryStrategy;

impl ChunkStrategy for JsBoundaryStrategy {
    fn attempt(&self, file_path: &str, content: &str, language: &str) -> Option<Vec<CodeChunk>> {
        if language != "javascript" && language != "typescript" {
            return None;
        }

        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return None;
        }

        // Each boundary opens a chunk running to the line before the next.
        let mut boundaries: Vec<(usize, String)> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if BOUNDARY_PATTERNS.iter().any(|p| p.is_match(line)) {
                boundaries.push((i, extract_js_symbol(line)));
            }
        }

        if boundaries.is_empty() {
            return None;
        }

        let mut chunks = Vec::new();

        // Imports and other leading content before the first boundary.
        if boundaries[0].0 > 0 {
            let preamble = lines[..boundaries[0].0].join("\n");
            let preamble = preamble.trim();
            if !preamble.is_empty() && preamble.lines().count() >= 2 {
                chunks.push(CodeChunk {
                    file_path: file_path.to_string(),
                    symbol: "<imports>".to_string(),
                    code: preamble.to_string(),
                    language: language.to_string(),
                    start_line: 1,
                    end_line: boundaries[0].0 as u32,
                });
            }
        }

        for (i, (line_idx, symbol)) in boundaries.iter().enumerate() {
            let start = *line_idx;
            let end = if i + 1 < boundaries.len() {
                boundaries[i + 1].0 - 1
            } else {
                lines.len() - 1
            };
            let code = lines[start..=end].join("\n");
            let code = code.trim_end();

            if !code.trim().is_empty() {
                chunks.push(CodeChunk {
                    file_path: file_path.to_string(),
                    symbol: symbol.clone(),
                    code: code.to_string(),
                    language: language.to_string(),
                    start_line: (start + 1) as u32,
                    end_line: (end + 1) as u32,
                });
            }
        }

        Some(chunks)
    }
}

// ============ Strategy 3: fixed line windows ============

struct LineWindowStrategy {
    max_chunk_lines: usize,
    window_lines: usize,
    overlap_lines: usize,
}

impl ChunkStrategy for LineWindowStrategy {
    fn attempt(&self, file_path: &str, content: &str, language: &str) -> Option<Vec<CodeChunk>> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return None;
        }

        // Small files become a single whole-file chunk.
        if lines.len() <= self.max_chunk_lines {
            return Some(vec![CodeChunk {
                file_path: file_path.to_string(),
                symbol: "<file>".to_string(),
                code: content.to_string(),
                language: language.to_string(),
                start_line: 1,
                end_line: lines.len() as u32,
            }]);
        }

        let step = self
            .window_lines
            .saturating_sub(self.overlap_lines)
            .max(1);
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut idx = 0usize;

        while start < lines.len() {
            let end = (start + self.window_lines).min(lines.len());
            chunks.push(CodeChunk {
                file_path: file_path.to_string(),
                symbol: format!("<block_{idx}>"),
                code: lines[start..end].join("\n"),
                language: language.to_string(),
                start_line: (start + 1) as u32,
                end_line: end as u32,
            });
            start += step;
            idx += 1;
        }

        Some(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> Chunker {
        Chunker::new(&ChunkingConfig::default())
    }

    fn windowed(window: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_chunk_lines: 10,
            window_lines: window,
            overlap_lines: overlap,
        })
    }

    #[test]
    fn test_python_short_docstring_yields_only_function() {
        let content = "\"\"\"Utility helpers.\n\"\"\"\n\ndef foo(a, b):\n    total = a + b\n    return total\n\nx = 1\ny = 2\nz = 3\n";
        let chunks = chunker().chunk_file("util.py", content, "python");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "foo");
        assert_eq!(chunks[0].start_line, 4);
        assert_eq!(chunks[0].end_line, 6);
        assert_eq!(chunks[0].code, "def foo(a, b):\n    total = a + b\n    return total");
    }

    #[test]
    fn test_python_long_preamble_becomes_module_chunk() {
        let content = "import os\nimport sys\nimport json\n\ndef main():\n    pass\n";
        let chunks = chunker().chunk_file("main.py", content, "python");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].symbol, "<module>");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].code, "import os\nimport sys\nimport json");
        assert_eq!(chunks[1].symbol, "main");
    }

    #[test]
    fn test_python_small_class_kept_whole() {
        let content = "class Point:\n    def __init__(self, x):\n        self.x = x\n\n    def norm(self):\n        return abs(self.x)\n";
        let chunks = chunker().chunk_file("point.py", content, "python");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "Point");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 6);
    }

    #[test]
    fn test_python_large_class_split_into_header_and_methods() {
        let mut content = String::from("class Big:\n");
        for i in 0..101 {
            content.push_str(&format!("    def m{i}(self):\n        pass\n"));
        }
        let chunks = chunker().chunk_file("big.py", &content, "python");
        assert_eq!(chunks.len(), 102);
        assert_eq!(chunks[0].symbol, "Big.<header>");
        assert_eq!(chunks[0].code, "class Big:");
        assert_eq!(chunks[1].symbol, "Big.m0");
        assert_eq!(chunks[1].start_line, 2);
        assert_eq!(chunks[1].end_line, 3);
        assert_eq!(chunks[101].symbol, "Big.m100");
    }

    #[test]
    fn test_python_decorated_function_spans_decorator() {
        let content = "@app.route(\"/\")\ndef index():\n    return \"ok\"\n";
        let chunks = chunker().chunk_file("app.py", content, "python");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "index");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn test_broken_python_falls_back_to_whole_file() {
        let content = "def broken(:\n    pass\n";
        let chunks = chunker().chunk_file("broken.py", content, "python");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "<file>");
        assert_eq!(chunks[0].code, content);
    }

    #[test]
    fn test_js_boundaries_and_imports_preamble() {
        let content = "import { x } from \"./x\";\nimport { y } from \"./y\";\n\nexport function alpha() {\n  return x;\n}\n\nconst beta = (a) => a * 2;\n\nclass Gamma {\n}\n";
        let chunks = chunker().chunk_file("mod.js", content, "javascript");
        let symbols: Vec<&str> = chunks.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["<imports>", "alpha", "beta", "Gamma"]);
        assert_eq!(chunks[0].end_line, 3);
        assert_eq!(chunks[1].start_line, 4);
        assert_eq!(chunks[1].end_line, 7);
        assert!(chunks[1].code.starts_with("export function alpha"));
    }

    #[test]
    fn test_js_single_import_line_is_not_a_preamble() {
        let content = "import { x } from \"./x\";\n\nfunction solo() {\n  return x;\n}\n";
        let chunks = chunker().chunk_file("solo.js", content, "javascript");
        let symbols: Vec<&str> = chunks.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["solo"]);
    }

    #[test]
    fn test_js_without_boundaries_falls_back() {
        let content = "const a = 1;\nconst b = 2;\n";
        let chunks = chunker().chunk_file("consts.js", content, "javascript");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "<file>");
        assert_eq!(chunks[0].language, "javascript");
    }

    #[test]
    fn test_fallback_small_file_single_chunk_verbatim() {
        let content = "alpha\nbeta\ngamma\n";
        let chunks = chunker().chunk_file("notes.txt", content, "text");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "<file>");
        assert_eq!(chunks[0].code, content);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn test_fallback_windows_overlap_and_cover() {
        let content = (1..=25)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let lines: Vec<&str> = content.lines().collect();
        let chunks = windowed(10, 3).chunk_file("big.txt", &content, "text");

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks.last().unwrap().end_line, 25);

        for pair in chunks.windows(2) {
            // Consecutive windows share exactly `overlap` lines.
            let overlap = pair[0].end_line + 1 - pair[1].start_line;
            assert_eq!(overlap, 3);
        }

        for (i, chunk) in chunks.iter().enumerate() {
            // Chunk text is an exact line-range slice of the source.
            let expected =
                lines[(chunk.start_line - 1) as usize..chunk.end_line as usize].join("\n");
            assert_eq!(chunk.code, expected);
            assert_eq!(chunk.symbol, format!("<block_{i}>"));
        }
    }

    #[test]
    fn test_empty_file_yields_no_chunks() {
        let chunks = chunker().chunk_file("empty.py", "", "python");
        assert!(chunks.is_empty());
    }
}
