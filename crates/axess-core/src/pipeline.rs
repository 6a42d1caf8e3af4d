use std::borrow::Cow;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use memchr::memmem;
use regex::Regex;

/// Resolves `\input`-like directives.
///
/// The cleaner itself never touches the file system; it hands the macro-expanded main file to an
/// implementation of this trait and continues with whatever text comes back.
pub trait IncludeExpander {
    /// Return `text` with all include directives replaced by the content they refer to.
    /// Relative paths are resolved against `base_dir`.
    fn expand(&mut self, text: &str, base_dir: &Path) -> io::Result<String>;
}

/// An [`IncludeExpander`] that leaves the text as it is.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIncludes;

impl IncludeExpander for NoIncludes {
    fn expand(&mut self, text: &str, _base_dir: &Path) -> io::Result<String> {
        Ok(text.to_string())
    }
}

/// Load the `axessibility` package right before `\begin{document}`.
///
/// The text is returned unchanged if it already loads the package or has no `\begin{document}`.
pub fn add_package(text: &str) -> Cow<'_, str> {
    static LOADED: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\\usepackage\s*(?:\[[^\]]*\])?\s*\{axessibility\}")
            .expect("valid package pattern")
    });

    if LOADED.is_match(text) {
        return Cow::Borrowed(text);
    }
    let Some(pos) = memmem::find(text.as_bytes(), br"\begin{document}") else {
        return Cow::Borrowed(text);
    };
    let mut result = String::with_capacity(text.len() + 26);
    result.push_str(&text[..pos]);
    result.push_str("\\usepackage{axessibility}\n");
    result.push_str(&text[pos..]);
    Cow::Owned(result)
}
