//! Prepare LaTeX sources for accessibility post-processing.
//!
//! Screen-reader tooling such as the `axessibility` package works best on documents that use
//! plain, self-contained math. This crate rewrites a LaTeX document into such a form: comments
//! are removed, user-defined zero-argument macros are inlined, and the TeX math delimiters `$` and
//! `$$` are replaced by their LaTeX equivalents `\(`, `\)`, `\[` and `\]`.
//!
//! # Usage
//!
//! The main struct of this library is [`Cleaner`]. Create an instance with a [`CleanerConfig`]
//! and call [`Cleaner::clean`]:
//!
//! ```rust
//! use std::path::Path;
//! use axess_core::{Cleaner, CleanerConfig, NoIncludes};
//!
//! let source = r"\documentclass{article}
//! \def\R{\mathbb{R}}
//! \begin{document}
//! For all $x \in \R$ we have $$x^2 \geq 0.$$
//! \end{document}";
//! let cleaner = Cleaner::new(CleanerConfig::default());
//! let cleaned = cleaner.clean(source, None, &mut NoIncludes, Path::new(".")).unwrap();
//! assert!(cleaned.text.contains(r"For all \(x \in \mathbb{R}\) we have \[x^2 \geq 0.\]"));
//! ```
//!
//! The individual stages are available on their own: [`strip`] removes comments, [`MacroCatalog`]
//! and [`Expander`] find and inline macros, and [`Normalizer`] rewrites the math delimiters.
//!
//! # Features
//!
//! - `serde`: With this feature, `CleanerConfig` and `Delimiter` implement serde's `Serialize`
//!   and `Deserialize`.
//! - `ariadne`: Adds [`ExpansionError::to_report`] for pretty-printing expansion failures.
//!
mod catalog;
mod character_class;
mod delimiters;
mod error;
mod expand;
mod pipeline;
mod strip;

use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::IntoStaticStr;

pub use self::catalog::{
    CommandType, DOCUMENT_END, DOCUMENT_START, MacroCatalog, MacroDefinition,
};
pub use self::delimiters::{
    Delimiter, DelimiterState, Normalizer, count_symbols, rewrite_spans, rewrite_text_wrapper,
};
pub use self::error::{CleanError, ExpansionErrKind, ExpansionError, UnsupportedDelimiter};
pub use self::expand::{
    DEFAULT_MAX_PASSES, ExpandedDocument, Expander, MAX_EXPANDED_LEN, SubstitutionRule,
    build_rules,
};
pub use self::pipeline::{IncludeExpander, NoIncludes, add_package};
pub use self::strip::{LexState, Stripped, strip, strip_with_state};

/// Configuration object for a [`Cleaner`].
///
/// # Example usage
///
/// ```rust
/// use axess_core::{CleanerConfig, Delimiter};
///
/// // Default values
/// let config = CleanerConfig::default();
///
/// // Extra macros, and only display math is rewritten
/// let config = CleanerConfig {
///     macros: vec![("R".to_string(), r"\mathbb{R}".to_string())],
///     delimiters: vec![Delimiter::Display],
///     ..Default::default()
/// };
/// ```
///
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "kebab-case"))]
pub struct CleanerConfig {
    /// Additional zero-argument macros; each tuple contains (macro_name, replacement). These come
    /// after the definitions found in the documents, so a document definition of the same name
    /// wins.
    #[cfg_attr(feature = "serde", serde(with = "tuple_vec_map"))]
    pub macros: Vec<(String, String)>,
    /// The number of full rule passes after which the expansion of a line is given up.
    pub max_expansion_passes: usize,
    /// The math delimiters to rewrite.
    pub delimiters: Vec<Delimiter>,
    /// If `true`, load the `axessibility` package right before `\begin{document}`.
    pub add_package: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        CleanerConfig {
            macros: Vec::new(),
            max_expansion_passes: DEFAULT_MAX_PASSES,
            delimiters: Delimiter::iter().collect(),
            add_package: false,
        }
    }
}

/// The two points at which macros are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Stage {
    #[strum(serialize = "before inclusion")]
    BeforeInclusion,
    #[strum(serialize = "after inclusion")]
    AfterInclusion,
}

/// The result of [`Cleaner::clean`].
#[derive(Debug, Clone)]
pub struct Cleaned {
    /// The final document.
    pub text: String,
    /// The main file after the first macro expansion, before included files were resolved.
    pub pre_inclusion: String,
    /// The document after included files were resolved and comments were removed again. Lines of
    /// [`Stage::AfterInclusion`] failures refer to this text; those of
    /// [`Stage::BeforeInclusion`] failures refer to the comment-free main file.
    pub included: String,
    /// All definitions that were collected.
    pub catalog: MacroCatalog,
    /// Lines that could not be expanded and were kept unchanged.
    pub failures: Vec<(Stage, ExpansionError)>,
    /// Set if the main file ended inside a `comment` or `verbatim` environment, or inside a
    /// `\makeatletter` block.
    pub unterminated: Option<LexState>,
}

/// Runs the whole cleaning pipeline on a document.
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    config: CleanerConfig,
}

impl Cleaner {
    pub fn new(config: CleanerConfig) -> Self {
        Cleaner { config }
    }

    #[inline]
    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Clean the document `main`.
    ///
    /// Definitions are collected from the preamble of `main`, then from `user_macros` (if given),
    /// then from the configuration. The body of `main` is expanded, its include directives are
    /// resolved by `includer`, and the result has its comments removed and is expanded once more.
    /// Finally, the math delimiters are rewritten.
    ///
    /// Lines that cannot be expanded do not make this fail; they are listed in
    /// [`Cleaned::failures`]. Only an error of `includer` is returned.
    pub fn clean(
        &self,
        main: &str,
        user_macros: Option<&str>,
        includer: &mut dyn IncludeExpander,
        base_dir: &Path,
    ) -> Result<Cleaned, CleanError> {
        let stripped = strip_with_state(main);

        let mut catalog = MacroCatalog::new();
        catalog.collect(&stripped.text);
        if let Some(user_macros) = user_macros {
            catalog.collect(&strip(user_macros));
        }
        for (name, replacement) in &self.config.macros {
            catalog.push(MacroDefinition::zero_arity(
                CommandType::Command,
                name,
                replacement,
            ));
        }

        let expander = Expander::new(&catalog).with_max_passes(self.config.max_expansion_passes);
        let mut failures = Vec::new();

        let first = expander.expand_document(&stripped.text);
        failures.extend(
            first
                .failures
                .into_iter()
                .map(|err| (Stage::BeforeInclusion, err)),
        );

        let included = strip(&includer.expand(&first.text, base_dir)?);
        let second = expander.expand_document(&included);
        failures.extend(
            second
                .failures
                .into_iter()
                .map(|err| (Stage::AfterInclusion, err)),
        );

        let mut text = second.text;
        if self.config.add_package
            && let std::borrow::Cow::Owned(with_package) = add_package(&text)
        {
            text = with_package;
        }

        let mut normalizer = Normalizer::with_delimiters(self.config.delimiters.iter().copied());
        let text = normalizer.normalize_text(&text);

        Ok(Cleaned {
            text,
            pre_inclusion: first.text,
            included,
            catalog,
            failures,
            unterminated: stripped
                .is_unterminated()
                .then_some(stripped.final_state),
        })
    }
}
