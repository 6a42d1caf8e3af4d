use std::fmt;
use std::io;
use std::ops::Range;

use strum_macros::IntoStaticStr;

/// Represents a failure to expand the macros on one line.
///
/// Expansion failures are not fatal: the line is kept as it was and the error is reported to the
/// caller next to the cleaned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionError {
    /// The 1-based number of the line in the text that was expanded.
    pub line: usize,
    /// Byte range of the line in the text that was expanded.
    pub span: Range<usize>,
    pub kind: ExpansionErrKind,
}

#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum ExpansionErrKind {
    /// The rules still matched after the maximum number of passes.
    #[strum(serialize = "pass limit exceeded")]
    PassLimitExceeded { limit: usize, macro_name: Box<str> },
    /// A full pass left the line unchanged, although a rule still matched.
    #[strum(serialize = "no progress")]
    NoProgress { macro_name: Box<str> },
    /// The expanded line grew beyond the hard length limit.
    #[strum(serialize = "limit exceeded")]
    HardLimitExceeded { macro_name: Box<str> },
}

impl ExpansionErrKind {
    /// The macro that was still matching when expansion gave up.
    pub fn macro_name(&self) -> &str {
        match self {
            ExpansionErrKind::PassLimitExceeded { macro_name, .. }
            | ExpansionErrKind::NoProgress { macro_name }
            | ExpansionErrKind::HardLimitExceeded { macro_name } => macro_name,
        }
    }

    /// Returns the error message as a string.
    pub fn string(&self) -> String {
        match self {
            ExpansionErrKind::PassLimitExceeded { limit, macro_name } => {
                format!(
                    "Macro \"{macro_name}\" still matches after {limit} expansion passes. Is it defined in terms of itself?"
                )
            }
            ExpansionErrKind::NoProgress { macro_name } => {
                format!("Macro \"{macro_name}\" expands to itself.")
            }
            ExpansionErrKind::HardLimitExceeded { macro_name } => {
                format!("Expanding macro \"{macro_name}\" makes the line too long.")
            }
        }
    }
}

impl ExpansionError {
    /// Move the error to the given line of a larger document.
    pub(crate) fn at_line(mut self, line: usize, span: Range<usize>) -> Self {
        self.line = line;
        self.span = span;
        self
    }

    pub fn error_message(&self) -> String {
        self.kind.string()
    }
}

#[cfg(feature = "ariadne")]
impl ExpansionError {
    /// Convert this error into an [`ariadne::Report`] for pretty-printing.
    ///
    /// Since the offending line is kept unchanged, this is reported as a warning.
    pub fn to_report<'name>(
        &self,
        source_name: &'name str,
        with_color: bool,
    ) -> ariadne::Report<'static, (&'name str, Range<usize>)> {
        use ariadne::{Label, Report, ReportKind};

        let label_msg = format!(
            "{} while expanding \"{}\"; line left unchanged",
            <&str>::from(&self.kind),
            self.kind.macro_name()
        );

        let mut config = ariadne::Config::default().with_index_type(ariadne::IndexType::Byte);
        if !with_color {
            config = config.with_color(false);
        }
        Report::build(
            ReportKind::Warning,
            (source_name, self.span.start..self.span.start),
        )
        .with_config(config)
        .with_message(self.kind.string())
        .with_label(Label::new((source_name, self.span.clone())).with_message(label_msg))
        .finish()
    }
}

impl fmt::Display for ExpansionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind.string())
    }
}

impl std::error::Error for ExpansionError {}

/// A math delimiter other than `$` or `$$` was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedDelimiter(pub Box<str>);

impl fmt::Display for UnsupportedDelimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unsupported delimiter \"{}\". Supported delimiters are \"$\" and \"$$\".",
            self.0
        )
    }
}

impl std::error::Error for UnsupportedDelimiter {}

/// Error type for a failed cleaning run.
#[derive(Debug)]
pub enum CleanError {
    /// The include expander failed.
    Include(io::Error),
}

impl fmt::Display for CleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanError::Include(err) => write!(f, "could not resolve included files: {}", err),
        }
    }
}

impl std::error::Error for CleanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CleanError::Include(err) => Some(err),
        }
    }
}

impl From<io::Error> for CleanError {
    fn from(err: io::Error) -> Self {
        CleanError::Include(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = ExpansionError {
            line: 7,
            span: 10..20,
            kind: ExpansionErrKind::NoProgress {
                macro_name: r"\x".into(),
            },
        };
        assert_eq!(err.to_string(), r#"line 7: Macro "\x" expands to itself."#);
        assert_eq!(err.kind.macro_name(), r"\x");
    }

    #[test]
    fn unsupported_delimiter_message() {
        let err = UnsupportedDelimiter("$$$".into());
        insta::assert_snapshot!(err, @r#"Unsupported delimiter "$$$". Supported delimiters are "$" and "$$"."#);
    }
}
