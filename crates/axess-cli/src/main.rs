use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

use clap::Parser;

use axess_core::{Cleaned, Cleaner, CleanerConfig, Stage, strip};

mod config_file;
mod include;

use config_file::{ConfigError, load_config_file};
use include::FileIncluder;

/// Name of the macro file that is picked up from the directory of the input file.
const USER_MACRO_FILE: &str = "user_macro.sty";

/// Cleans a LaTeX document for accessibility post-processing
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Inlines user macros, removes comments and normalizes math delimiters in a LaTeX document",
    long_about = None
)]
struct Args {
    /// The LaTeX file to clean (must end in .tex)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Where to write the result (default: the input file with "_clean" appended to its name)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// File with additional macro definitions (default: user_macro.sty next to the input)
    #[arg(short, long, value_name = "FILE")]
    macros: Option<PathBuf>,

    /// TOML file with the cleaner configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run pdflatex on the result
    #[arg(short, long, conflicts_with = "dry_run")]
    pdflatex: bool,

    /// Also write the main file as it was before included files were resolved
    #[arg(long, value_name = "FILE")]
    pre_inclusion: Option<PathBuf>,

    /// Dry run: clean but don't write anything
    #[arg(long)]
    dry_run: bool,

    /// Report what is being done
    #[arg(short, long)]
    verbose: bool,

    /// Don't use colors in diagnostics
    #[arg(long)]
    no_color: bool,
}

fn main() {
    let args = Args::parse();
    if args.input.extension().is_none_or(|ext| ext != "tex") {
        eprintln!(
            "The input file '{}' is not a .tex file",
            args.input.display()
        );
        std::process::exit(2);
    }

    let config = match args.config {
        Some(ref path) => match load_config_file(path) {
            Ok(config) => config.cleaner,
            Err(e) => exit_config_error(e, path),
        },
        None => CleanerConfig::default(),
    };

    let base_dir = match args.input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let source = read_file(&args.input);
    let user_macros = read_user_macros(&args, base_dir);

    let cleaner = Cleaner::new(config);
    let mut includer = FileIncluder::default();
    let cleaned = cleaner
        .clean(&source, user_macros.as_deref(), &mut includer, base_dir)
        .unwrap_or_else(|e| {
            eprintln!("Cleaning error in '{}': {}", args.input.display(), e);
            std::process::exit(1);
        });

    if args.verbose {
        eprintln!("Collected {} macro definitions", cleaned.catalog.len());
        for path in includer.included() {
            eprintln!("Included '{}'", path.display());
        }
    }
    if let Some(state) = cleaned.unterminated {
        eprintln!(
            "Warning: '{}' ends inside a {}; everything after its start was removed",
            args.input.display(),
            <&str>::from(state)
        );
    }
    report_failures(&args, &source, &cleaned);

    if args.dry_run {
        return;
    }
    if let Some(ref path) = args.pre_inclusion {
        write_file(path, &cleaned.pre_inclusion);
    }
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));
    write_file(&output, &cleaned.text);
    if args.verbose {
        eprintln!("Wrote '{}'", output.display());
    }

    if args.pdflatex {
        run_pdflatex(&output);
    }
}

/// Read the macro file given on the command line, or the default one if it exists.
fn read_user_macros(args: &Args, base_dir: &Path) -> Option<String> {
    let path = match args.macros {
        Some(ref path) => path.clone(),
        None => base_dir.join(USER_MACRO_FILE),
    };
    match fs::read_to_string(&path) {
        Ok(content) => {
            if args.verbose {
                eprintln!("Reading macros from '{}'", path.display());
            }
            Some(content)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && args.macros.is_none() => None,
        Err(e) => exit_io_error(e, &path),
    }
}

/// `dir/name.tex` becomes `dir/name_clean.tex`.
fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    input.with_file_name(format!("{stem}_clean.tex"))
}

/// Print every line that could not be expanded as a warning.
fn report_failures(args: &Args, source: &str, cleaned: &Cleaned) {
    if cleaned.failures.is_empty() {
        return;
    }
    let stripped_main = strip(source);
    for (stage, failure) in &cleaned.failures {
        let name = source_name(&args.input, *stage);
        let text = match stage {
            Stage::BeforeInclusion => stripped_main.as_str(),
            Stage::AfterInclusion => cleaned.included.as_str(),
        };
        let report = failure.to_report(&name, !args.no_color);
        if let Err(e) = report.eprint((name.as_str(), ariadne::Source::from(text))) {
            exit_io_error(e, &args.input);
        }
    }
    eprintln!(
        "{} line(s) could not be expanded and were left unchanged",
        cleaned.failures.len()
    );
}

/// Name under which a failure at `stage` is reported, e.g. `main.tex (after inclusion)`.
fn source_name(input: &Path, stage: Stage) -> String {
    format!("{} ({})", input.display(), <&str>::from(stage))
}

fn run_pdflatex(output: &Path) {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = output.file_name().unwrap_or(output.as_os_str());
    let status = Command::new("pdflatex")
        .arg("-interaction=nonstopmode")
        .arg(file_name)
        .current_dir(dir)
        .status()
        .unwrap_or_else(|e| {
            eprintln!("Could not run pdflatex: {}", e);
            std::process::exit(1);
        });
    if !status.success() {
        eprintln!("pdflatex failed on '{}' ({})", output.display(), status);
        std::process::exit(2);
    }
}

fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| exit_io_error(e, path))
}

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).unwrap_or_else(|e| exit_io_error(e, path));
}

fn exit_config_error(e: ConfigError, fp: &Path) -> ! {
    eprintln!("Configuration error in '{}': {}", fp.display(), e);
    std::process::exit(2);
}

fn exit_io_error(e: io::Error, fp: &Path) -> ! {
    eprintln!("IO Error in '{}': {}", fp.display(), e);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn output_name() {
        assert_eq!(
            default_output(Path::new("paper/main.tex")),
            PathBuf::from("paper/main_clean.tex")
        );
        assert_eq!(
            default_output(Path::new("thesis.tex")),
            PathBuf::from("thesis_clean.tex")
        );
    }

    #[test]
    fn failure_source_names() {
        let input = Path::new("paper/main.tex");
        assert_eq!(
            source_name(input, Stage::BeforeInclusion),
            "paper/main.tex (before inclusion)"
        );
        assert_eq!(
            source_name(input, Stage::AfterInclusion),
            "paper/main.tex (after inclusion)"
        );
    }

    #[test]
    fn parse_flags() {
        let args = Args::try_parse_from([
            "axesscleaner",
            "main.tex",
            "-o",
            "out.tex",
            "-c",
            "axess.toml",
            "--pre-inclusion",
            "pre.tex",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(args.output, Some(PathBuf::from("out.tex")));
        assert_eq!(args.config, Some(PathBuf::from("axess.toml")));
        assert_eq!(args.pre_inclusion, Some(PathBuf::from("pre.tex")));
        assert!(args.no_color);
        assert!(!args.pdflatex);

        assert!(Args::try_parse_from(["axesscleaner", "main.tex", "-p", "--dry-run"]).is_err());
    }

    #[test]
    fn user_macros_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(USER_MACRO_FILE), "\\def\\x{y}\n").unwrap();
        let args = Args::try_parse_from(["axesscleaner", "main.tex"]).unwrap();
        assert_eq!(
            read_user_macros(&args, dir.path()).as_deref(),
            Some("\\def\\x{y}\n")
        );

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(read_user_macros(&args, empty.path()), None);
    }
}
