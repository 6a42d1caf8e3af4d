//! Inlining zero-argument macros.

use std::borrow::Cow;

use memchr::memmem::{self, Finder};

use crate::catalog::{DOCUMENT_END, DOCUMENT_START, MacroCatalog};
use crate::character_class::strip_disallowed;
use crate::error::{ExpansionErrKind, ExpansionError};

/// The default number of full rule passes before expansion gives up.
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Expanded lines longer than this (in bytes) are treated as runaway recursion.
pub const MAX_EXPANDED_LEN: usize = 1 << 20;

/// Replaces a macro name with its definition.
///
/// The name only matches if it is not immediately followed by an ASCII letter, so that a rule for
/// `\foo` leaves `\foobar` alone. The replacement is inserted literally.
#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    name: Box<str>,
    replacement: Box<str>,
    finder: Finder<'static>,
}

impl SubstitutionRule {
    pub fn new(name: &str, replacement: &str) -> Self {
        SubstitutionRule {
            name: name.into(),
            replacement: replacement.into(),
            finder: Finder::new(name.as_bytes()).into_owned(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Iterate over the byte offsets of all matches in `haystack`.
    fn matches<'h>(&'h self, haystack: &'h str) -> impl Iterator<Item = usize> + 'h {
        let bytes = haystack.as_bytes();
        let len = self.name.len();
        self.finder
            .find_iter(bytes)
            .filter(move |&pos| !bytes.get(pos + len).is_some_and(u8::is_ascii_alphabetic))
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.matches(haystack).next().is_some()
    }

    /// Replace every match in `haystack`. Borrows the input if nothing matched.
    pub fn apply<'h>(&self, haystack: &'h str) -> Cow<'h, str> {
        let mut result = String::new();
        let mut last = 0;
        for pos in self.matches(haystack) {
            result.push_str(&haystack[last..pos]);
            result.push_str(&self.replacement);
            last = pos + self.name.len();
        }
        if last == 0 {
            return Cow::Borrowed(haystack);
        }
        result.push_str(&haystack[last..]);
        Cow::Owned(result)
    }
}

/// Derive substitution rules from a catalog, in catalog order.
///
/// Definitions made with `\DeclareMathOperator` and definitions that take parameters do not
/// produce a rule.
pub fn build_rules(catalog: &MacroCatalog) -> Vec<SubstitutionRule> {
    catalog
        .iter()
        .filter(|definition| definition.is_expandable())
        .map(|definition| SubstitutionRule::new(&definition.macro_name, &definition.raw_replacement))
        .collect()
}

/// A document after macro expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedDocument {
    /// The non-blank lines of the document, each terminated by `\n`.
    pub text: String,
    /// Lines whose expansion failed. These lines were kept unchanged.
    pub failures: Vec<ExpansionError>,
}

/// Applies a fixed set of substitution rules.
#[derive(Debug, Clone)]
pub struct Expander {
    rules: Vec<SubstitutionRule>,
    max_passes: usize,
}

impl Expander {
    /// Create an expander for all expandable definitions in `catalog`.
    pub fn new(catalog: &MacroCatalog) -> Self {
        Self::from_rules(build_rules(catalog))
    }

    pub fn from_rules(rules: Vec<SubstitutionRule>) -> Self {
        Expander {
            rules,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Set the number of full rule passes after which expansion of a line fails.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    #[inline]
    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    /// Expand all macros on a single line.
    ///
    /// All rules are applied in order; this is repeated until no rule matches anymore. Afterwards,
    /// disallowed characters are removed.
    ///
    /// ```rust
    /// use axess_core::{Expander, SubstitutionRule};
    ///
    /// let expander = Expander::from_rules(vec![
    ///     SubstitutionRule::new(r"\R", r"\mathbb{R}"),
    ///     SubstitutionRule::new(r"\RR", r"\R^2"),
    /// ]);
    /// let line = expander.expand_line(r"$x \in \RR$, $\Rightarrow$").unwrap();
    /// assert_eq!(line, r"$x \in \mathbb{R}^2$, $\Rightarrow$");
    /// ```
    pub fn expand_line(&self, line: &str) -> Result<String, ExpansionError> {
        let fail = |kind| ExpansionError {
            line: 1,
            span: 0..line.len(),
            kind,
        };

        let mut current = line.to_string();
        let mut passes = 0;
        while let Some(pending) = self.rules.iter().find(|rule| rule.is_match(&current)) {
            if passes == self.max_passes {
                return Err(fail(ExpansionErrKind::PassLimitExceeded {
                    limit: self.max_passes,
                    macro_name: pending.name.clone(),
                }));
            }
            passes += 1;

            let before = current.clone();
            for rule in &self.rules {
                if let Cow::Owned(replaced) = rule.apply(&current) {
                    current = replaced;
                    if current.len() > MAX_EXPANDED_LEN {
                        return Err(fail(ExpansionErrKind::HardLimitExceeded {
                            macro_name: rule.name.clone(),
                        }));
                    }
                }
            }
            if current == before {
                return Err(fail(ExpansionErrKind::NoProgress {
                    macro_name: pending.name.clone(),
                }));
            }
        }

        if let Cow::Owned(stripped) = strip_disallowed(&current) {
            current = stripped;
        }
        Ok(current)
    }

    /// Expand the macros in the body of a document.
    ///
    /// Lines up to and including the one with [`DOCUMENT_START`] are copied unchanged, the lines
    /// of the body are expanded, the line with [`DOCUMENT_END`] is copied and everything after it
    /// is dropped. Without a start marker, nothing is expanded. Blank lines are left out of the
    /// result.
    ///
    /// A line that fails to expand is copied unchanged and its error is collected.
    pub fn expand_document(&self, text: &str) -> ExpandedDocument {
        let start_finder = memmem::Finder::new(DOCUMENT_START);
        let end_finder = memmem::Finder::new(DOCUMENT_END);

        let mut document = ExpandedDocument {
            text: String::with_capacity(text.len()),
            failures: Vec::new(),
        };
        let mut in_body = false;
        let mut offset = 0;
        for (idx, line) in text.split('\n').enumerate() {
            let span = offset..offset + line.len();
            offset = span.end + 1;

            let mut is_last = false;
            let line: Cow<'_, str> = if !in_body {
                in_body = start_finder.find(line.as_bytes()).is_some();
                Cow::Borrowed(line)
            } else if end_finder.find(line.as_bytes()).is_some() {
                is_last = true;
                Cow::Borrowed(line)
            } else {
                match self.expand_line(line) {
                    Ok(expanded) => Cow::Owned(expanded),
                    Err(err) => {
                        document.failures.push(err.at_line(idx + 1, span));
                        Cow::Borrowed(line)
                    }
                }
            };

            if !line.trim_end().is_empty() {
                document.text.push_str(&line);
                document.text.push('\n');
            }
            if is_last {
                break;
            }
        }
        document
    }
}
