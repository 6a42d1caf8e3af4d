use std::borrow::Cow;

/// Characters that must not survive into the cleaned document.
///
/// This covers the C0 control characters except tab, line feed and carriage return, as well as
/// everything from DEL up to the end of the Latin-1 block.
#[inline]
pub(crate) fn is_disallowed(ch: char) -> bool {
    matches!(ch, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}'..='\u{ff}')
}

/// Remove all disallowed characters from `line`.
///
/// Borrows the input if there is nothing to remove.
pub(crate) fn strip_disallowed(line: &str) -> Cow<'_, str> {
    if line.chars().any(is_disallowed) {
        Cow::Owned(line.chars().filter(|&ch| !is_disallowed(ch)).collect())
    } else {
        Cow::Borrowed(line)
    }
}
