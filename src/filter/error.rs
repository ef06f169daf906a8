use std::fmt;
use thiserror::Error;

/// Byte range of a token in the expression source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A filter expression that failed to parse or type check.
///
/// Carries the 1-indexed line and column of the offending span. The
/// `Display` impl renders the source line with a caret underline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct FilterError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// Width of the offending span in characters, at least 1
    pub width: usize,
    /// Source line containing the error
    pub source_line: String,
}

impl FilterError {
    pub fn new(message: impl Into<String>, source: &str, span: Span) -> Self {
        let start = span.start.min(source.len());
        let end = span.end.clamp(start, source.len());

        let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = source[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(source.len());

        let line = source[..start].matches('\n').count() + 1;
        let column = source[line_start..start].chars().count() + 1;
        let width = source[start..end.min(line_end)].chars().count().max(1);

        FilterError {
            message: message.into(),
            line,
            column,
            width,
            source_line: source[line_start..line_end].to_string(),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gutter = self.line.to_string().len();
        writeln!(f, "{}", self.message)?;
        writeln!(f, "{:>gutter$}--> {}:{}", "", self.line, self.column)?;
        writeln!(f, "{:>gutter$} |", "")?;
        writeln!(f, "{} | {}", self.line, self.source_line)?;
        write!(
            f,
            "{:>gutter$} | {}{}",
            "",
            " ".repeat(self.column - 1),
            "^".repeat(self.width)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_single_line() {
        let err = FilterError::new("unknown identifier", "http.blob ~ \"x\"", Span::new(0, 9));

        assert_eq!(err.line, 1);
        assert_eq!(err.column, 1);
        assert_eq!(err.width, 9);
    }

    #[test]
    fn test_position_multi_line() {
        let source = "http.request.method == \"GET\"\nand nope";
        let start = source.find("nope").unwrap();
        let err = FilterError::new("unknown identifier", source, Span::new(start, start + 4));

        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
        assert_eq!(err.source_line, "and nope");
    }

    #[test]
    fn test_caret_rendering() {
        let err = FilterError::new("unknown identifier", "len(x) == 1", Span::new(4, 5));
        let rendered = err.to_string();

        assert!(rendered.starts_with("unknown identifier"));
        assert!(rendered.contains("--> 1:5"));
        assert!(rendered.contains("1 | len(x) == 1"));
        assert!(rendered.ends_with("  |     ^"));
    }
}
