//! Rewriting `$...$` and `$$...$$` to `\(...\)` and `\[...\]`.
//!
//! Only spans that open and close on the same line are rewritten. To avoid misreading half of a
//! multi-line span, the normalizer keeps running counts of the delimiters seen so far and only
//! rewrites a line while the counts are even. Inside `array`, `tabular` and `table` environments,
//! `$` is frequently not a math delimiter, so single-dollar spans are left alone there.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::LazyLock;

use memchr::memmem;
use regex::Regex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, IntoStaticStr};

use crate::character_class::strip_disallowed;
use crate::error::UnsupportedDelimiter;

/// The math delimiters that can be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "String", into = "&'static str")
)]
pub enum Delimiter {
    /// `$...$`, rewritten to `\(...\)`.
    #[strum(serialize = "$")]
    Inline,
    /// `$$...$$`, rewritten to `\[...\]`.
    #[strum(serialize = "$$")]
    Display,
}

impl Delimiter {
    #[inline]
    pub fn symbol(self) -> &'static str {
        self.into()
    }

    #[inline]
    pub fn open(self) -> &'static str {
        match self {
            Delimiter::Inline => r"\(",
            Delimiter::Display => r"\[",
        }
    }

    #[inline]
    pub fn close(self) -> &'static str {
        match self {
            Delimiter::Inline => r"\)",
            Delimiter::Display => r"\]",
        }
    }
}

impl FromStr for Delimiter {
    type Err = UnsupportedDelimiter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Delimiter::iter()
            .find(|delimiter| delimiter.symbol() == s)
            .ok_or_else(|| UnsupportedDelimiter(s.into()))
    }
}

impl TryFrom<String> for Delimiter {
    type Error = UnsupportedDelimiter;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Whether the byte at `pos` is preceded by an odd number of backslashes.
fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    bytes[..pos]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count()
        % 2
        == 1
}

/// Count the occurrences of `delimiter` on a line.
///
/// For [`Delimiter::Inline`], this counts every unescaped `$` that does not directly follow
/// another `$`. For [`Delimiter::Display`], it counts non-overlapping, unescaped `$$`.
pub fn count_symbols(line: &str, delimiter: Delimiter) -> usize {
    let bytes = line.as_bytes();
    match delimiter {
        Delimiter::Inline => memchr::memchr_iter(b'$', bytes)
            .filter(|&pos| (pos == 0 || bytes[pos - 1] != b'$') && !is_escaped(bytes, pos))
            .count(),
        Delimiter::Display => {
            let mut count = 0;
            let mut from = 0;
            while let Some(pos) = find_double(bytes, from) {
                count += 1;
                from = pos + 2;
            }
            count
        }
    }
}

/// The next unescaped `$$` at or after `from`.
fn find_double(bytes: &[u8], mut from: usize) -> Option<usize> {
    while let Some(rel) = memmem::find(&bytes[from..], b"$$") {
        let pos = from + rel;
        if !is_escaped(bytes, pos) {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}

/// Find the first complete span of `delimiter` on the line.
///
/// Returns the byte positions of the opening and the closing delimiter.
fn find_span(line: &str, delimiter: Delimiter) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    match delimiter {
        Delimiter::Inline => {
            for open in memchr::memchr_iter(b'$', bytes) {
                if (open > 0 && bytes[open - 1] == b'$') || is_escaped(bytes, open) {
                    continue;
                }
                // The content must not start with another `$`.
                if matches!(bytes.get(open + 1), None | Some(b'$' | b'\n')) {
                    continue;
                }
                // A line break ends the search even when a backslash precedes it.
                let close = memchr::memchr2_iter(b'$', b'\n', &bytes[open + 1..])
                    .map(|rel| open + 1 + rel)
                    .find(|&pos| bytes[pos] == b'\n' || !is_escaped(bytes, pos));
                if let Some(close) = close
                    && bytes[close] == b'$'
                {
                    return Some((open, close));
                }
            }
            None
        }
        Delimiter::Display => {
            let open = find_double(bytes, 0)?;
            let close = find_double(bytes, open + 2)?;
            if memchr::memchr(b'\n', &bytes[open..close]).is_some() {
                return None;
            }
            Some((open, close))
        }
    }
}

/// Rewrite the first complete span of `delimiter` on the line, if there is one.
fn rewrite_first(line: &str, delimiter: Delimiter) -> Option<String> {
    let (open, close) = find_span(line, delimiter)?;
    let width = delimiter.symbol().len();
    let mut result = String::with_capacity(line.len() + 2);
    result.push_str(&line[..open]);
    result.push_str(delimiter.open());
    result.push_str(&line[open + width..close]);
    result.push_str(delimiter.close());
    result.push_str(&line[close + width..]);
    Some(result)
}

/// Rewrite all complete spans of `delimiter` on a single line.
///
/// Nothing is rewritten while the line contains an odd number of the delimiter, since then one
/// of them belongs to a span that continues on another line.
///
/// ```rust
/// use axess_core::{Delimiter, rewrite_spans};
///
/// assert_eq!(rewrite_spans("$a$ and $b$", Delimiter::Inline), r"\(a\) and \(b\)");
/// assert_eq!(rewrite_spans("$a$ and $b", Delimiter::Inline), "$a$ and $b");
/// ```
pub fn rewrite_spans<'a>(line: impl Into<Cow<'a, str>>, delimiter: Delimiter) -> Cow<'a, str> {
    let mut line = line.into();
    while count_symbols(&line, delimiter) % 2 == 0 {
        let Some(rewritten) = rewrite_first(&line, delimiter) else {
            break;
        };
        line = Cow::Owned(rewritten);
    }
    line
}

/// Rewrite the first inline span inside the first `\mbox`, `\textrm` or `\mathrm` on the line.
///
/// The content of the wrapper reaches up to the first `}` that is not preceded by a backslash.
/// Returns `None` if the line contains no such wrapper. Any `$` outside the wrapper is left as
/// it is.
pub fn rewrite_text_wrapper(line: &str) -> Option<String> {
    static WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\\(?:mbox|textrm|mathrm)\s*\{").expect("valid wrapper pattern")
    });

    let bytes = line.as_bytes();
    for m in WRAPPER.find_iter(line) {
        let start = m.end();
        let Some(end) = memchr::memchr2_iter(b'}', b'\n', &bytes[start..])
            .map(|rel| start + rel)
            .find(|&pos| bytes[pos] == b'\n' || bytes[pos - 1] != b'\\')
        else {
            continue;
        };
        if bytes[end] == b'\n' {
            continue;
        }
        let inner = &line[start..end];
        if count_symbols(inner, Delimiter::Inline) % 2 != 0 {
            return Some(line.to_string());
        }
        let Some(rewritten) = rewrite_first(inner, Delimiter::Inline) else {
            return Some(line.to_string());
        };
        let mut result = String::with_capacity(line.len() + 2);
        result.push_str(&line[..start]);
        result.push_str(&rewritten);
        result.push_str(&line[end..]);
        return Some(result);
    }
    None
}

fn environment_change(line: &str) -> i64 {
    static END_ENV: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\\end\{?(?:array|tabular|table)").expect("valid environment pattern")
    });
    static BEGIN_ENV: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\\begin\{?(?:array|tabular|table)").expect("valid environment pattern")
    });

    if END_ENV.is_match(line) {
        -1
    } else if BEGIN_ENV.is_match(line) {
        1
    } else {
        0
    }
}

/// Running counters of a normalization session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterState {
    /// Number of single `$` seen so far.
    pub dollar_count: u64,
    /// Number of `$$` seen so far.
    pub double_dollar_count: u64,
    /// Net number of open `array`/`tabular`/`table` environments.
    pub env_depth: i64,
}

impl DelimiterState {
    /// Account for the delimiters and environments on `line`.
    pub fn observe(&mut self, line: &str) {
        self.dollar_count += count_symbols(line, Delimiter::Inline) as u64;
        self.double_dollar_count += count_symbols(line, Delimiter::Display) as u64;
        self.env_depth += environment_change(line);
    }

    /// Whether spans of `delimiter` may be rewritten on the current line.
    ///
    /// Note the asymmetry: `$$` spans are also rewritten inside table-like environments as long as
    /// the running `$$` count is even.
    pub fn allows(&self, delimiter: Delimiter) -> bool {
        match delimiter {
            Delimiter::Inline => self.dollar_count % 2 == 0 && self.env_depth == 0,
            Delimiter::Display => self.double_dollar_count % 2 == 0 || self.env_depth == 0,
        }
    }
}

/// Normalizes math delimiters line by line, keeping state across lines.
#[derive(Debug, Clone)]
pub struct Normalizer {
    state: DelimiterState,
    delimiters: Vec<Delimiter>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// A normalizer for both `$` and `$$`.
    pub fn new() -> Self {
        Self::with_delimiters(Delimiter::iter())
    }

    /// A normalizer that only rewrites the given delimiters.
    ///
    /// The running counts are kept for all delimiters regardless.
    pub fn with_delimiters(delimiters: impl IntoIterator<Item = Delimiter>) -> Self {
        Normalizer {
            state: DelimiterState::default(),
            delimiters: delimiters.into_iter().collect(),
        }
    }

    #[inline]
    pub fn state(&self) -> &DelimiterState {
        &self.state
    }

    #[inline]
    fn is_enabled(&self, delimiter: Delimiter) -> bool {
        self.delimiters.contains(&delimiter)
    }

    /// Normalize the next line of the document.
    ///
    /// ```rust
    /// use axess_core::Normalizer;
    ///
    /// let mut normalizer = Normalizer::new();
    /// assert_eq!(normalizer.normalize_line("This is a Formula: $3+4$"), r"This is a Formula: \(3+4\)");
    /// assert_eq!(normalizer.normalize_line("$$x^2$$"), r"\[x^2\]");
    /// ```
    pub fn normalize_line(&mut self, line: &str) -> String {
        let mut line: Cow<'_, str> = Cow::Borrowed(line);
        if self.is_enabled(Delimiter::Inline)
            && let Some(rewritten) = rewrite_text_wrapper(&line)
        {
            line = Cow::Owned(strip_disallowed(&rewritten).into_owned());
        }

        self.state.observe(&line);

        for delimiter in Delimiter::iter() {
            if self.is_enabled(delimiter) && self.state.allows(delimiter) {
                line = rewrite_spans(line, delimiter);
            }
        }
        line.into_owned()
    }

    /// Normalize a sequence of lines.
    pub fn normalize<I, S>(&mut self, lines: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .map(|line| self.normalize_line(line.as_ref()))
            .collect()
    }

    /// Normalize every line of `text`, keeping the line terminators.
    pub fn normalize_text(&mut self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let (content, terminator) = match line.strip_suffix('\n') {
                Some(content) => (content, "\n"),
                None => (line, ""),
            };
            result.push_str(&self.normalize_line(content));
            result.push_str(terminator);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delimiter() {
        assert_eq!("$".parse::<Delimiter>().unwrap(), Delimiter::Inline);
        assert_eq!("$$".parse::<Delimiter>().unwrap(), Delimiter::Display);
        let err = r"\(".parse::<Delimiter>().unwrap_err();
        assert_eq!(err, UnsupportedDelimiter(r"\(".into()));
        assert!(Delimiter::try_from("$$$".to_string()).is_err());
    }

    #[test]
    fn counting() {
        assert_eq!(count_symbols("$a$ $$b$$", Delimiter::Inline), 4);
        assert_eq!(count_symbols("$a$ $$b$$", Delimiter::Display), 2);
        assert_eq!(count_symbols(r"\$5 and \\$x$", Delimiter::Inline), 2);
        assert_eq!(count_symbols("$$$", Delimiter::Display), 1);
        assert_eq!(count_symbols(r"\$$x$$", Delimiter::Display), 1);
    }

    #[test]
    fn inline_formula() {
        let mut normalizer = Normalizer::new();
        assert_eq!(
            normalizer.normalize_line("This is a Formula: $3+4$"),
            r"This is a Formula: \(3+4\)"
        );
    }

    #[test]
    fn several_spans_on_one_line() {
        let mut normalizer = Normalizer::new();
        assert_eq!(
            normalizer.normalize_line("$a$, $b$ and $$c$$ or $$d$$"),
            r"\(a\), \(b\) and \[c\] or \[d\]"
        );
    }

    #[test]
    fn display_formula() {
        let mut normalizer = Normalizer::new();
        assert_eq!(normalizer.normalize_line("$$x^2$$"), r"\[x^2\]");
        assert_eq!(normalizer.normalize_line("$$$$"), r"\[\]");
    }

    #[test]
    fn escaped_dollars_are_text() {
        let mut normalizer = Normalizer::new();
        assert_eq!(
            normalizer.normalize_line(r"costs \$5 and $x$"),
            r"costs \$5 and \(x\)"
        );
    }

    #[test]
    fn text_wrapper() {
        let line = r"Test $ f(x)+g(x) = F(x) \mbox{ where $f(x)$ and $g(x)$ are smooth} $";
        assert_eq!(
            rewrite_text_wrapper(line).unwrap(),
            r"Test $ f(x)+g(x) = F(x) \mbox{ where \(f(x)\) and $g(x)$ are smooth} $"
        );
        assert_eq!(
            rewrite_text_wrapper(r"\textrm {if $x>0$}").unwrap(),
            r"\textrm {if \(x>0\)}"
        );
        // The content ends at the first unescaped brace.
        assert_eq!(
            rewrite_text_wrapper(r"\mathrm{a\}$b$} $c$").unwrap(),
            r"\mathrm{a\}\(b\)} $c$"
        );
        assert_eq!(
            rewrite_text_wrapper(r"\mbox{no math} $x$").unwrap(),
            r"\mbox{no math} $x$"
        );
        assert!(rewrite_text_wrapper("This is a Formula: $3+4$").is_none());
        assert!(rewrite_text_wrapper(r"\mbox{unclosed $x$").is_none());
    }

    #[test]
    fn multi_line_span_is_left_alone() {
        let mut normalizer = Normalizer::new();
        let lines = ["Let $x", "= 1$ and $y$ here", "then $z$"];
        assert_eq!(
            normalizer.normalize(lines),
            ["Let $x", "= 1$ and $y$ here", r"then \(z\)"]
        );
        assert_eq!(normalizer.state().dollar_count, 6);
    }

    #[test]
    fn multi_line_display_is_left_alone() {
        let mut normalizer = Normalizer::new();
        let lines = ["$$", "x^2 $$ and $$y$$", "$$z$$"];
        assert_eq!(
            normalizer.normalize(lines),
            ["$$", "x^2 $$ and $$y$$", r"\[z\]"]
        );
    }

    #[test]
    fn escaped_line_break_ends_inline_search() {
        let line = "$a\\\nb$";
        assert_eq!(count_symbols(line, Delimiter::Inline), 2);
        assert_eq!(rewrite_spans(line, Delimiter::Inline), line);
        assert_eq!(
            rewrite_spans("$a\\\\$ $b$", Delimiter::Inline),
            r"\(a\\\) \(b\)"
        );
    }

    #[test]
    fn display_outside_environment_ignores_parity() {
        let mut normalizer = Normalizer::new();
        let lines = [
            "$$",
            "$$a$$ x",
            r"\begin{array}{c}",
            "$$b$$",
            r"\end{array}",
            "$$c$$",
        ];
        // The running `$$` count is odd from the first line on.
        assert_eq!(
            normalizer.normalize(lines),
            [
                "$$",
                r"\[a\] x",
                r"\begin{array}{c}",
                "$$b$$",
                r"\end{array}",
                r"\[c\]",
            ]
        );
        assert_eq!(normalizer.state().double_dollar_count, 7);
        assert_eq!(normalizer.state().env_depth, 0);
    }

    #[test]
    fn tabular_suppresses_inline() {
        let mut normalizer = Normalizer::new();
        let lines = [
            r"\begin{tabular}{cc}",
            r"$a$ & $b$ \\",
            r"$$c$$ \\",
            r"\end{tabular}",
            r"$d$",
        ];
        assert_eq!(
            normalizer.normalize(lines),
            [
                r"\begin{tabular}{cc}",
                r"$a$ & $b$ \\",
                r"\[c\] \\",
                r"\end{tabular}",
                r"\(d\)",
            ]
        );
        assert_eq!(normalizer.state().env_depth, 0);
    }

    #[test]
    fn env_patterns() {
        assert_eq!(environment_change(r"\begin{array}{c}"), 1);
        assert_eq!(environment_change(r"\begin{table}[h]"), 1);
        assert_eq!(environment_change(r"\end{tabular} \begin{tabular}"), -1);
        assert_eq!(environment_change(r"\begin{align}"), 0);
    }

    #[test]
    fn only_selected_delimiters() {
        let mut normalizer = Normalizer::with_delimiters([Delimiter::Display]);
        assert_eq!(
            normalizer.normalize_line(r"$a$ and $$b$$ \mbox{$c$}"),
            r"$a$ and \[b\] \mbox{$c$}"
        );
    }

    #[test]
    fn normalize_text_keeps_terminators() {
        let mut normalizer = Normalizer::new();
        assert_eq!(normalizer.normalize_text("$a$\n\n$b$"), "\\(a\\)\n\n\\(b\\)");
    }
}
