use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use axess_core::{IncludeExpander, strip};
use regex::{Captures, Regex};

/// Includes nested deeper than this are treated as a cycle.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Resolves `\input{…}`, `\include{…}` and `\subfile{…}` from disk.
///
/// All paths are relative to the directory of the main file, like LaTeX does it. Included files
/// have their comments removed before they are searched for further directives.
#[derive(Debug, Default)]
pub struct FileIncluder {
    included: Vec<PathBuf>,
}

impl FileIncluder {
    /// The files that were included so far, in the order they were read.
    pub fn included(&self) -> &[PathBuf] {
        &self.included
    }

    fn expand_nested(&mut self, text: &str, base_dir: &Path, depth: usize) -> io::Result<String> {
        static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"\\(?:input|include|subfile)\s*\{\s*([^{}]+?)\s*\}")
                .expect("valid include pattern")
        });

        if memchr::memchr(b'\\', text.as_bytes()).is_none() {
            return Ok(text.to_string());
        }

        let mut result = String::with_capacity(text.len());
        let mut last = 0;
        for caps in DIRECTIVE.captures_iter(text) {
            let (directive, name) = directive_and_name(&caps);
            if depth == MAX_INCLUDE_DEPTH {
                return Err(io::Error::other(format!(
                    "'{name}' is nested more than {MAX_INCLUDE_DEPTH} includes deep; do the files include each other?"
                )));
            }
            let path = resolve(base_dir, name);
            let content = fs::read_to_string(&path)
                .map_err(|err| io::Error::new(err.kind(), format!("{}: {err}", path.display())))?;
            self.included.push(path);

            result.push_str(&text[last..directive.start]);
            result.push_str(&self.expand_nested(&strip(&content), base_dir, depth + 1)?);
            last = directive.end;
        }
        result.push_str(&text[last..]);
        Ok(result)
    }
}

impl IncludeExpander for FileIncluder {
    fn expand(&mut self, text: &str, base_dir: &Path) -> io::Result<String> {
        self.expand_nested(text, base_dir, 0)
    }
}

fn directive_and_name<'t>(caps: &Captures<'t>) -> (std::ops::Range<usize>, &'t str) {
    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let name = caps.get(1).map_or("", |m| m.as_str());
    (whole, name)
}

/// Find the file for an include directive; `.tex` is appended if the name as given does not
/// exist.
fn resolve(base_dir: &Path, name: &str) -> PathBuf {
    let path = base_dir.join(name);
    if path.is_file() || name.ends_with(".tex") {
        return path;
    }
    let mut with_ext = OsString::from(path);
    with_ext.push(".tex");
    PathBuf::from(with_ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).expect("failed to write test file");
    }

    #[test]
    fn nested_includes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "intro.tex", "Intro % note\n\\input{details}\n");
        write(dir.path(), "details.tex", "Details");
        write(dir.path(), "data.txt", "raw data");

        let mut includer = FileIncluder::default();
        let text = "\\begin{document}\n\\include{intro}\n\\input{ data.txt }\n\\end{document}\n";
        let expanded = includer.expand(text, dir.path()).unwrap();
        assert_eq!(
            expanded,
            "\\begin{document}\nIntro \nDetails\n\nraw data\n\\end{document}\n"
        );
        let names: Vec<_> = includer
            .included()
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(names, ["intro.tex", "details.tex", "data.txt"]);
    }

    #[test]
    fn commented_directives_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "part.tex", "%\\input{missing}\nkept");
        let expanded = FileIncluder::default()
            .expand("\\subfile{part}", dir.path())
            .unwrap();
        assert_eq!(expanded, "\nkept");
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileIncluder::default()
            .expand("\\input{nowhere}", dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("nowhere.tex"));
    }

    #[test]
    fn include_cycle() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.tex", "\\input{b}");
        write(dir.path(), "b.tex", "\\input{a}");
        let err = FileIncluder::default()
            .expand("\\input{a}", dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("nested more than"));
    }

    #[test]
    fn text_without_directives() {
        let text = "no commands here";
        let expanded = FileIncluder::default()
            .expand(text, Path::new("."))
            .unwrap();
        assert_eq!(expanded, text);
    }
}
