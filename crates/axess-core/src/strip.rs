//! Comment stripping.
//!
//! The stripper is a small state machine that walks the source once and decides, token by token,
//! whether the token is copied to the output. `%` starts a line comment everywhere except inside
//! `verbatim` environments and `\makeatletter ... \makeatother` blocks. In the latter, catcode
//! changes can make `%` significant, so the `%` itself is kept while the rest of its line is
//! still dropped.

use strum_macros::IntoStaticStr;

/// The lexical states of the stripper. Exactly one is active at any time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum LexState {
    #[default]
    #[strum(serialize = "initial")]
    Initial,
    /// After an unescaped `%`, up to the end of the line.
    #[strum(serialize = "line comment")]
    LineComment,
    /// Inside `\begin{comment} ... \end{comment}`.
    #[strum(serialize = r"comment environment")]
    CommentEnv,
    /// Inside `\begin{verbatim} ... \end{verbatim}`.
    #[strum(serialize = r"verbatim environment")]
    Verbatim,
    /// Inside `\makeatletter ... \makeatother`.
    #[strum(serialize = r"\makeatletter block")]
    MakeatBlock,
    /// After a `%` inside a makeat block, up to the end of the line.
    #[strum(serialize = r"comment in \makeatletter block")]
    MakeatLineComment,
}

/// The result of a stripping pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    /// The comment-free text.
    pub text: String,
    /// The state the stripper was in when the input ended.
    ///
    /// Anything other than [`LexState::Initial`] or [`LexState::LineComment`] means that an
    /// environment or block was never closed.
    pub final_state: LexState,
}

impl Stripped {
    /// Whether a `comment`/`verbatim` environment or a makeat block was left open.
    pub fn is_unterminated(&self) -> bool {
        !matches!(self.final_state, LexState::Initial | LexState::LineComment)
    }
}

/// Remove comments from LaTeX source.
///
/// This never fails; see [`strip_with_state`] if the final lexer state is of interest.
///
/// ```rust
/// let source = "x = 1 % set x\n\\% is kept\n";
/// assert_eq!(axess_core::strip(source), "x = 1 \n\\% is kept\n");
/// ```
pub fn strip(source: &str) -> String {
    strip_with_state(source).text
}

/// Remove comments from LaTeX source and report the final lexer state.
pub fn strip_with_state(source: &str) -> Stripped {
    let mut stripper = Stripper::new(source);
    stripper.run();
    Stripped {
        text: stripper.output,
        final_state: stripper.state,
    }
}

/// One row of the transition table: how many bytes the matched token spans, whether the token is
/// copied to the output, and the state to continue in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub len: usize,
    pub emit: bool,
    pub next: LexState,
}

impl Transition {
    #[inline]
    const fn emit(len: usize, next: LexState) -> Self {
        Transition {
            len,
            emit: true,
            next,
        }
    }

    #[inline]
    const fn discard(len: usize, next: LexState) -> Self {
        Transition {
            len,
            emit: false,
            next,
        }
    }
}

struct Stripper<'source> {
    input: &'source str,
    pos: usize,
    state: LexState,
    output: String,
}

impl<'source> Stripper<'source> {
    fn new(input: &'source str) -> Self {
        Stripper {
            input,
            pos: 0,
            state: LexState::Initial,
            output: String::with_capacity(input.len()),
        }
    }

    fn run(&mut self) {
        while self.pos < self.input.len() {
            let rest = &self.input[self.pos..];
            let Transition { len, emit, next } = transition(self.state, rest);
            if emit {
                self.output.push_str(&rest[..len]);
            }
            self.pos += len;
            self.state = next;
        }
    }
}

/// Compute the next transition for the (non-empty) remaining input `rest`.
///
/// Within a state, the patterns are tried in a fixed order and the first one that matches wins.
/// Every state ends with a rule that consumes a single character, so this never gets stuck.
pub(crate) fn transition(state: LexState, rest: &str) -> Transition {
    use LexState::*;

    let one = first_char_len(rest);
    let newline = rest.starts_with('\n');
    match state {
        Initial => {
            if rest.starts_with(r"\\") {
                // An escaped backslash must not be mistaken for the escape of a following `%`.
                Transition::emit(2, Initial)
            } else if rest.starts_with(r"\makeatletter") {
                Transition::emit(r"\makeatletter".len(), MakeatBlock)
            } else if rest.starts_with('%') {
                Transition::discard(1, LineComment)
            } else if rest.starts_with(r"\%") {
                Transition::emit(2, Initial)
            } else if let Some(len) = environment_marker(rest, "begin", "comment") {
                Transition::discard(len, CommentEnv)
            } else if let Some(len) = environment_marker(rest, "begin", "verbatim") {
                Transition::emit(len, Verbatim)
            } else {
                Transition::emit(one, Initial)
            }
        }
        LineComment => {
            if newline {
                Transition::emit(1, Initial)
            } else {
                Transition::discard(one, LineComment)
            }
        }
        CommentEnv => {
            if let Some(len) = environment_marker(rest, "end", "comment") {
                // The remainder of the `\end{comment}` line is dropped as well.
                Transition::discard(len, LineComment)
            } else {
                Transition::discard(one, CommentEnv)
            }
        }
        Verbatim => {
            if let Some(len) = environment_marker(rest, "end", "verbatim") {
                Transition::emit(len, Initial)
            } else {
                Transition::emit(one, Verbatim)
            }
        }
        MakeatBlock => {
            if rest.starts_with(r"\makeatother") {
                Transition::emit(r"\makeatother".len(), Initial)
            } else if rest.starts_with(r"\\") || rest.starts_with(r"\%") {
                Transition::emit(2, MakeatBlock)
            } else if rest.starts_with('%') {
                Transition::emit(1, MakeatLineComment)
            } else {
                Transition::emit(one, MakeatBlock)
            }
        }
        MakeatLineComment => {
            if newline {
                Transition::emit(1, MakeatBlock)
            } else {
                Transition::discard(one, MakeatLineComment)
            }
        }
    }
}

#[inline]
fn first_char_len(rest: &str) -> usize {
    rest.chars().next().map_or(0, char::len_utf8)
}

/// Match `\<keyword>\s*{\s*<name>\s*}` at the start of `rest` and return its length in bytes.
fn environment_marker(rest: &str, keyword: &str, name: &str) -> Option<usize> {
    let after_backslash = rest.strip_prefix('\\')?;
    let after_keyword = after_backslash.strip_prefix(keyword)?;
    let after_open = skip_tex_whitespace(after_keyword).strip_prefix('{')?;
    let after_name = skip_tex_whitespace(after_open).strip_prefix(name)?;
    let after_close = skip_tex_whitespace(after_name).strip_prefix('}')?;
    Some(rest.len() - after_close.len())
}

#[inline]
fn skip_tex_whitespace(s: &str) -> &str {
    s.trim_start_matches([' ', '\t', '\n', '\r', '\u{b}', '\u{c}'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_comment_keeps_newline() {
        assert_eq!(strip("a % comment\nb\n"), "a \nb\n");
        assert_eq!(strip("%only a comment\n%another\n"), "\n\n");
        assert_eq!(strip("no newline % at end"), "no newline ");
    }

    #[test]
    fn escaped_percent_survives() {
        assert_eq!(strip(r"50\% of cases % not this"), r"50\% of cases ");
    }

    #[test]
    fn escaped_backslash_before_percent() {
        // `\\` is a line break, so the `%` after it starts a comment.
        assert_eq!(strip("a\\\\% gone\nb"), "a\\\\\nb");
    }

    #[test]
    fn verbatim_is_preserved() {
        let source = "x\n\\begin{verbatim}\n100% literal \\% and % more\n\\end{verbatim} % gone\ny";
        assert_eq!(
            strip(source),
            "x\n\\begin{verbatim}\n100% literal \\% and % more\n\\end{verbatim} \ny"
        );
    }

    #[test]
    fn verbatim_marker_tolerates_whitespace() {
        let source = "\\begin { verbatim }\n% kept\n\\end{ verbatim }\n% dropped\n";
        assert_eq!(
            strip(source),
            "\\begin { verbatim }\n% kept\n\\end{ verbatim }\n\n"
        );
    }

    #[test]
    fn comment_environment_is_removed() {
        let source = "a\n\\begin{comment}\nhidden\n% hidden too\n\\end{comment} trailing\nb\n";
        assert_eq!(strip(source), "a\n\nb\n");
    }

    #[test]
    fn comment_environment_with_whitespace() {
        let source = "a\\begin {\ncomment }x\\end{comment}y\nb";
        assert_eq!(strip(source), "a\nb");
    }

    #[test]
    fn makeat_block_keeps_percent() {
        let source = "\\makeatletter\n\\def\\x{%\n  y}% note\n\\makeatother\nz % gone\n";
        assert_eq!(
            strip(source),
            "\\makeatletter\n\\def\\x{%\n  y}%\n\\makeatother\nz \n"
        );
    }

    #[test]
    fn makeat_block_escapes() {
        let source = "\\makeatletter \\% \\\\% tail\n\\makeatother";
        assert_eq!(strip(source), "\\makeatletter \\% \\\\%\n\\makeatother");
    }

    #[test]
    fn multibyte_characters() {
        assert_eq!(strip("über % café\nα"), "über \nα");
    }

    #[test]
    fn final_state_is_reported() {
        let stripped = strip_with_state("\\begin{verbatim}\nnever closed");
        assert_eq!(stripped.final_state, LexState::Verbatim);
        assert!(stripped.is_unterminated());

        let stripped = strip_with_state("text % trailing comment");
        assert_eq!(stripped.final_state, LexState::LineComment);
        assert!(!stripped.is_unterminated());
    }

    #[test]
    fn idempotent() {
        let sources = [
            "a % c\n\\% b\n",
            "\\begin{comment}x\\end{comment} y\nz",
            "\\begin{verbatim}%\n\\end{verbatim}%x\n",
            "\\makeatletter\n%a\n\\makeatother%b\n",
            "plain text only",
        ];
        for source in sources {
            let once = strip(source);
            assert_eq!(strip(&once), once, "not idempotent for {source:?}");
        }
    }

    #[test]
    fn transition_table() {
        let t = transition(LexState::Initial, "%x");
        assert_eq!(t, Transition::discard(1, LexState::LineComment));
        let t = transition(LexState::Initial, r"\makeatletter");
        assert_eq!(t, Transition::emit(13, LexState::MakeatBlock));
        let t = transition(LexState::MakeatLineComment, "x\n");
        assert_eq!(t, Transition::discard(1, LexState::MakeatLineComment));
        let t = transition(LexState::CommentEnv, "\\end{comment}\n");
        assert_eq!(t, Transition::discard(13, LexState::LineComment));
        assert_eq!(<&str>::from(LexState::MakeatBlock), r"\makeatletter block");
    }
}
