//! Lightweight brace counter.
//!
//! Not a tokenizer: it only knows enough about string literals and comments
//! to keep braces inside them out of the count. Single-quoted literals end
//! at the end of the line so Rust lifetimes cannot swallow the rest of a
//! file.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ScanState {
    #[default]
    Code,
    BlockComment,
    Str(char),
}

#[derive(Debug, Clone, Default)]
pub struct BraceScanner {
    depth: i64,
    state: ScanState,
    opened: bool,
    /// Lowest depth seen so far
    min_depth: i64,
}

impl BraceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth relative to the first scanned line.
    pub fn depth(&self) -> i64 {
        self.depth
    }

    /// Whether any `{` has been seen.
    pub fn opened(&self) -> bool {
        self.opened
    }

    /// Whether the depth ever dropped below zero.
    pub fn underflowed(&self) -> bool {
        self.min_depth < 0
    }

    /// Whether the scanner ended inside a string or block comment.
    pub fn in_literal(&self) -> bool {
        self.state != ScanState::Code
    }

    /// Feed one line (terminator optional).
    pub fn scan_line(&mut self, line: &str) {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match self.state {
                ScanState::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        self.state = ScanState::Code;
                    }
                }
                ScanState::Str(quote) => {
                    if c == '\\' {
                        chars.next();
                    } else if c == quote {
                        self.state = ScanState::Code;
                    }
                }
                ScanState::Code => match c {
                    '/' if chars.peek() == Some(&'/') => break,
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        self.state = ScanState::BlockComment;
                    }
                    '"' | '\'' | '`' => self.state = ScanState::Str(c),
                    '{' => {
                        self.depth += 1;
                        self.opened = true;
                    }
                    '}' => {
                        self.depth -= 1;
                        self.min_depth = self.min_depth.min(self.depth);
                    }
                    _ => {}
                },
            }
        }

        if self.state == ScanState::Str('\'') {
            self.state = ScanState::Code;
        }
    }
}

/// Whether `text` closes every brace it opens, never closes one it did not
/// open, and does not end inside a string or comment.
pub fn is_balanced(text: &str) -> bool {
    let mut scanner = BraceScanner::new();
    for line in text.lines() {
        scanner.scan_line(line);
        if scanner.underflowed() {
            return false;
        }
    }
    scanner.depth() == 0 && !scanner.in_literal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_function() {
        assert!(is_balanced("function f() {\n    if (x) {\n    }\n}\n"));
        assert!(is_balanced("no braces at all"));
        assert!(is_balanced(""));
    }

    #[test]
    fn test_unbalanced() {
        assert!(!is_balanced("function f() {\n"));
        assert!(!is_balanced("}\n{"));
        assert!(!is_balanced("    }\n}\n"));
    }

    #[test]
    fn test_braces_in_strings_and_comments_are_ignored() {
        assert!(is_balanced("f() {\n    $s = \"{$var}\";\n}\n"));
        assert!(is_balanced("f() {\n    // closes }\n}\n"));
        assert!(is_balanced("f() {\n    /* { */\n}\n"));
        assert!(is_balanced("f() {\n    /* multi\n    } line */\n}\n"));
        assert!(is_balanced("f() {\n    let c = '{';\n}\n"));
        assert!(is_balanced("f() {\n    $s = 'it\\'s }';\n}\n"));
    }

    #[test]
    fn test_lifetimes_do_not_swallow_lines() {
        assert!(is_balanced("impl<'a> Foo<'a> {\n    fn x(&'a self) {}\n}\n"));
    }

    #[test]
    fn test_unterminated_string_is_unbalanced() {
        assert!(!is_balanced("f() {\n    $s = \"oops;\n}\n"));
    }

    #[test]
    fn test_depth_tracking() {
        let mut scanner = BraceScanner::new();
        scanner.scan_line("fn f() {");
        assert_eq!(scanner.depth(), 1);
        assert!(scanner.opened());
        scanner.scan_line("    } else {");
        assert_eq!(scanner.depth(), 1);
        scanner.scan_line("}");
        assert_eq!(scanner.depth(), 0);
        assert!(!scanner.underflowed());
    }
}
