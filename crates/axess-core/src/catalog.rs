//! Collecting macro definitions from a preamble.

use std::sync::LazyLock;

use memchr::memmem;
use phf::phf_map;
use regex::Regex;
use rustc_hash::FxHashMap;
use strum_macros::IntoStaticStr;

/// Marks the line where the document body starts.
///
/// The leading `\b` is left out on purpose; the marker is searched as a bare substring.
pub const DOCUMENT_START: &str = "egin{document}";

/// Marks the line where the document body ends. Searched as a bare substring, like
/// [`DOCUMENT_START`].
pub const DOCUMENT_END: &str = "nd{document}";

/// The command that introduced a macro definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum CommandType {
    /// `\newcommand`, `\renewcommand`, `\providecommand` and everything else ending in `command`.
    #[strum(serialize = r"\newcommand")]
    Command,
    #[strum(serialize = r"\DeclareMathOperator")]
    DeclareMathOperator,
    #[strum(serialize = r"\def")]
    Def,
    #[strum(serialize = r"\edef")]
    Edef,
    #[strum(serialize = r"\xdef")]
    Xdef,
    #[strum(serialize = r"\gdef")]
    Gdef,
}

static COMMAND_KEYWORDS: phf::Map<&'static str, CommandType> = phf_map! {
    "DeclareMathOperator" => CommandType::DeclareMathOperator,
    "def" => CommandType::Def,
    "edef" => CommandType::Edef,
    "xdef" => CommandType::Xdef,
    "gdef" => CommandType::Gdef,
};

impl CommandType {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match COMMAND_KEYWORDS.get(keyword) {
            Some(ty) => Some(*ty),
            None if keyword.ends_with("command") => Some(CommandType::Command),
            None => None,
        }
    }
}

/// A single macro definition, as found on one line of a preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub command_type: CommandType,
    /// The macro name, including the leading backslash.
    pub macro_name: String,
    /// The number of parameters, if the definition declares any.
    pub arity: Option<u8>,
    pub raw_replacement: String,
}

impl MacroDefinition {
    /// A definition that takes no arguments.
    ///
    /// A missing leading backslash is added to `name`.
    pub fn zero_arity(command_type: CommandType, name: &str, replacement: &str) -> Self {
        let macro_name = if name.starts_with('\\') {
            name.to_string()
        } else {
            format!("\\{name}")
        };
        MacroDefinition {
            command_type,
            macro_name,
            arity: None,
            raw_replacement: replacement.to_string(),
        }
    }

    /// Try to read a macro definition from a single line.
    ///
    /// Returns `None` if the line does not contain a definition. The replacement text reaches up
    /// to the last unescaped `}` on the line.
    pub fn parse_line(line: &str) -> Option<Self> {
        static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"\\(.*command|DeclareMathOperator|def|edef|xdef|gdef)(\{?)(\\[a-zA-Z]+)(\}?)(\[([0-9])\]| *)\{(.*)\}.*$",
            )
            .expect("valid definition pattern")
        });

        let caps = DEFINITION.captures(line)?;
        let command_type = CommandType::from_keyword(caps.get(1)?.as_str())?;
        let macro_name = caps.get(3)?.as_str().to_string();
        let arity = caps
            .get(6)
            .and_then(|digit| digit.as_str().parse::<u8>().ok());
        let replacement_start = caps.get(7)?.start();
        let replacement_end = last_unescaped_brace(line, replacement_start)?;
        let raw_replacement = remove_stray_backslashes(&line[replacement_start..replacement_end]);
        Some(MacroDefinition {
            command_type,
            macro_name,
            arity,
            raw_replacement,
        })
    }

    /// Whether a substitution rule can be derived from this definition.
    #[inline]
    pub fn is_expandable(&self) -> bool {
        self.arity.is_none() && !matches!(self.command_type, CommandType::DeclareMathOperator)
    }
}

/// Position of the last `}` at or after `from` that is not preceded by an odd number of
/// backslashes.
fn last_unescaped_brace(line: &str, from: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    memchr::memrchr_iter(b'}', &bytes[from..])
        .map(|rel| from + rel)
        .find(|&pos| {
            bytes[..pos]
                .iter()
                .rev()
                .take_while(|&&b| b == b'\\')
                .count()
                % 2
                == 0
        })
}

/// Drop backslashes that do not start a command.
///
/// A backslash followed by a blank (space or tab) loses the blank as well, unless the blank is
/// followed by a letter. A backslash at the very end is dropped. Escaped backslashes (`\\`) and
/// control symbols such as `\{` or `\,` are kept.
fn remove_stray_backslashes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.peek().copied() {
            None => {}
            Some(blank @ (' ' | '\t')) => {
                chars.next();
                if chars.peek().is_some_and(char::is_ascii_alphabetic) {
                    result.push(blank);
                }
            }
            Some(next) => {
                result.push('\\');
                if !next.is_ascii_alphabetic() {
                    // A control symbol; its second character can never start another command.
                    result.push(next);
                    chars.next();
                }
            }
        }
    }
    result
}

/// An ordered, append-only collection of macro definitions.
///
/// Definitions are kept in the order they were found. A later definition with the same name does
/// not replace an earlier one.
#[derive(Debug, Default, Clone)]
pub struct MacroCatalog {
    definitions: Vec<MacroDefinition>,
    /// Index of the first definition for every macro name.
    first_by_name: FxHashMap<String, usize>,
}

impl MacroCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, definition: MacroDefinition) {
        self.first_by_name
            .entry(definition.macro_name.clone())
            .or_insert(self.definitions.len());
        self.definitions.push(definition);
    }

    /// Scan the preamble of `source` for macro definitions and append them.
    ///
    /// Scanning stops at the first line containing [`DOCUMENT_START`]; if there is no such line,
    /// the whole input is scanned. Returns the number of definitions that were added.
    pub fn collect(&mut self, source: &str) -> usize {
        let start_finder = memmem::Finder::new(DOCUMENT_START);
        let before = self.definitions.len();
        for line in source.split('\n') {
            if start_finder.find(line.as_bytes()).is_some() {
                break;
            }
            if let Some(definition) = MacroDefinition::parse_line(line) {
                self.push(definition);
            }
        }
        self.definitions.len() - before
    }

    /// The first definition of `name` (including the backslash).
    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        let idx = *self.first_by_name.get(name)?;
        self.definitions.get(idx)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MacroDefinition> {
        self.definitions.iter()
    }
}

impl<'a> IntoIterator for &'a MacroCatalog {
    type Item = &'a MacroDefinition;
    type IntoIter = std::slice::Iter<'a, MacroDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
