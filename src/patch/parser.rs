//! Parser for search/replace change blocks.
//!
//! A change string holds one or more fenced blocks. Each block names a target
//! file and carries one or more hunks:
//!
//! ````text
//! src/app.js
//! ```js
//! <<<<<<< SEARCH
//! return true;
//! =======
//! return false;
//! >>>>>>> REPLACE
//! ```
//! ````
//!
//! The path may also sit on the first line inside the fence. Text outside
//! blocks is ignored.

use crate::patch::errors::{PatchError, PatchResult};

pub const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
pub const SEPARATOR_MARKER: &str = "=======";
pub const REPLACE_MARKER: &str = ">>>>>>> REPLACE";
const FENCE: &str = "```";

/// One search/replace unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub search: String,
    pub replace: String,
}

/// Hunks for one file, applied in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub path: String,
    pub hunks: Vec<Hunk>,
}

/// A parsed apply_changes payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditRequest {
    pub files: Vec<FileEdit>,
}

impl EditRequest {
    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }
}

/// Parse a change string into typed file edits
pub fn parse_changes(input: &str) -> PatchResult<EditRequest> {
    Parser::new(input).parse()
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn is_marker(line: &str) -> bool {
    matches!(line.trim(), SEARCH_MARKER | SEPARATOR_MARKER | REPLACE_MARKER)
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    /// Last non-blank line seen outside a block
    last_text: Option<&'a str>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let lines = input
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();
        Self {
            lines,
            pos: 0,
            last_text: None,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    /// 1-based line number of the current position
    fn line_no(&self) -> usize {
        self.pos + 1
    }

    fn parse(mut self) -> PatchResult<EditRequest> {
        let mut request = EditRequest::default();

        while let Some(line) = self.peek() {
            if is_fence(line) {
                request.files.push(self.block()?);
                self.last_text = None;
            } else {
                if is_marker(line) {
                    return Err(PatchError::parse(
                        self.line_no(),
                        "marker outside of a fenced block",
                    ));
                }
                if !line.trim().is_empty() {
                    self.last_text = Some(line.trim());
                }
                self.pos += 1;
            }
        }

        if request.files.is_empty() {
            return Err(PatchError::parse(self.line_no(), "no change blocks found"));
        }
        Ok(request)
    }

    /// block := fence [path] hunk+ [fence]
    fn block(&mut self) -> PatchResult<FileEdit> {
        let fence_line = self.line_no();
        let info = self
            .peek()
            .map(|line| line.trim_start()[FENCE.len()..].trim())
            .unwrap_or_default();
        self.pos += 1;

        let path = match self.peek() {
            Some(next) if !next.trim().is_empty() && !is_marker(next) && !is_fence(next) => {
                self.pos += 1;
                next.trim()
            }
            _ => match self.last_text {
                Some(text) => text,
                None if !info.is_empty() => info,
                None => {
                    return Err(PatchError::parse(fence_line, "change block names no file"));
                }
            },
        };

        let mut hunks = Vec::new();
        while let Some(line) = self.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.pos += 1;
            } else if is_fence(line) {
                self.pos += 1;
                break;
            } else if trimmed == SEARCH_MARKER {
                hunks.push(self.hunk()?);
            } else {
                return Err(PatchError::parse(
                    self.line_no(),
                    format!("expected '{SEARCH_MARKER}' or a closing fence in block for {path}"),
                ));
            }
        }

        if hunks.is_empty() {
            return Err(PatchError::parse(
                fence_line,
                format!("change block for {path} has no hunks"),
            ));
        }

        Ok(FileEdit {
            path: path.to_string(),
            hunks,
        })
    }

    /// hunk := SEARCH line* SEPARATOR line* REPLACE
    fn hunk(&mut self) -> PatchResult<Hunk> {
        let start = self.line_no();
        self.pos += 1;
        let search = self.section_until(SEPARATOR_MARKER, start)?;
        let replace = self.section_until(REPLACE_MARKER, start)?;
        Ok(Hunk { search, replace })
    }

    /// Collect lines up to `marker`, consuming the marker
    fn section_until(&mut self, marker: &str, hunk_start: usize) -> PatchResult<String> {
        let begin = self.pos;
        while let Some(line) = self.peek() {
            if line.trim() == marker {
                let text = self.lines[begin..self.pos].join("\n");
                self.pos += 1;
                return Ok(text);
            }
            if line.trim() == SEARCH_MARKER {
                break;
            }
            self.pos += 1;
        }
        Err(PatchError::parse(
            hunk_start,
            format!("hunk is missing '{marker}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_then_path() {
        let input = "```\nsrc/app.js\n<<<<<<< SEARCH\nreturn true;\n=======\nreturn false;\n>>>>>>> REPLACE\n```";
        let request = parse_changes(input).unwrap();
        assert_eq!(
            request.files,
            vec![FileEdit {
                path: "src/app.js".to_string(),
                hunks: vec![Hunk {
                    search: "return true;".to_string(),
                    replace: "return false;".to_string(),
                }],
            }]
        );
    }

    #[test]
    fn test_path_then_fence_with_language() {
        let input = "src/main.py\n```python\n<<<<<<< SEARCH\ndef a():\n    pass\n=======\ndef a():\n    return 1\n>>>>>>> REPLACE\n```\n";
        let request = parse_changes(input).unwrap();
        assert_eq!(request.files[0].path, "src/main.py");
        assert_eq!(request.files[0].hunks[0].search, "def a():\n    pass");
        assert_eq!(request.files[0].hunks[0].replace, "def a():\n    return 1");
    }

    #[test]
    fn test_multiple_hunks_and_files() {
        let input = "\
Some prose the client added.

```
a.txt
<<<<<<< SEARCH
one
=======
1
>>>>>>> REPLACE

<<<<<<< SEARCH
two
=======
2
>>>>>>> REPLACE
```

b.txt
```
<<<<<<< SEARCH
=======
new file
>>>>>>> REPLACE
```";
        let request = parse_changes(input).unwrap();
        assert_eq!(request.files.len(), 2);
        assert_eq!(request.files[0].path, "a.txt");
        assert_eq!(request.files[0].hunks.len(), 2);
        assert_eq!(request.files[1].path, "b.txt");
        assert_eq!(request.files[1].hunks[0].search, "");
        assert_eq!(request.files[1].hunks[0].replace, "new file");
        assert_eq!(request.hunk_count(), 3);
    }

    #[test]
    fn test_info_string_as_path() {
        let input = "```src/lib.rs\n<<<<<<< SEARCH\nfoo\n=======\nbar\n>>>>>>> REPLACE\n```";
        let request = parse_changes(input).unwrap();
        assert_eq!(request.files[0].path, "src/lib.rs");
    }

    #[test]
    fn test_crlf_input() {
        let input = "```\r\na.txt\r\n<<<<<<< SEARCH\r\nx\r\n=======\r\ny\r\n>>>>>>> REPLACE\r\n```\r\n";
        let request = parse_changes(input).unwrap();
        assert_eq!(request.files[0].hunks[0].search, "x");
    }

    #[test]
    fn test_fence_inside_hunk_is_content() {
        let input = "```\nREADME.md\n<<<<<<< SEARCH\n```sh\nold\n```\n=======\n```sh\nnew\n```\n>>>>>>> REPLACE\n```";
        let request = parse_changes(input).unwrap();
        assert_eq!(request.files[0].hunks[0].search, "```sh\nold\n```");
    }

    #[test]
    fn test_unclosed_block_at_end_is_accepted() {
        let input = "```\na.txt\n<<<<<<< SEARCH\nx\n=======\ny\n>>>>>>> REPLACE\n";
        assert_eq!(parse_changes(input).unwrap().files.len(), 1);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_changes(""), Err(PatchError::Parse { .. })));
        assert!(matches!(parse_changes("just prose"), Err(PatchError::Parse { .. })));

        // Missing separator
        let input = "```\na.txt\n<<<<<<< SEARCH\nx\n>>>>>>> REPLACE\n```";
        assert!(matches!(parse_changes(input), Err(PatchError::Parse { .. })));

        // Missing replace marker
        let input = "```\na.txt\n<<<<<<< SEARCH\nx\n=======\ny\n";
        assert!(matches!(parse_changes(input), Err(PatchError::Parse { .. })));

        // No file name anywhere
        let input = "```\n<<<<<<< SEARCH\nx\n=======\ny\n>>>>>>> REPLACE\n```";
        assert!(matches!(parse_changes(input), Err(PatchError::Parse { .. })));

        // Block without hunks
        let input = "```\na.txt\n```";
        assert!(matches!(parse_changes(input), Err(PatchError::Parse { .. })));

        // Stray marker
        let input = "=======\n";
        assert!(matches!(parse_changes(input), Err(PatchError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_garbage_inside_block() {
        let input = "```\na.txt\nnot a marker\n```";
        match parse_changes(input) {
            Err(PatchError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
