use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::path::AbsolutePath;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Category tag of a resolution failure. None of these abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An alias chain leads back to an alias currently being resolved.
    CircularAliasReference,
    /// Index lookup recursed past its depth limit.
    CircularConfigOrIndexReference,
    /// Two or more targets share an identifier.
    DuplicateIdentifier,
    /// The referenced document is restricted to fewer output formats.
    RestrictedTargetFormat,
    /// More anonymous references than anonymous definitions.
    TooManyAnonymousReferences,
    /// More auto-number footnote references than definitions.
    TooManyAutoNumberReferences,
    /// More auto-symbol footnote references than definitions.
    TooManyAutoSymbolReferences,
    /// No target matches the id or path.
    UnresolvedReference,
}

impl ErrorKind {
    /// Stable short tag for reports and machine output.
    pub const fn tag(self) -> &'static str {
        return match self {
            ErrorKind::CircularAliasReference => "circular-alias",
            ErrorKind::CircularConfigOrIndexReference => "circular-index",
            ErrorKind::DuplicateIdentifier => "duplicate-id",
            ErrorKind::RestrictedTargetFormat => "restricted-format",
            ErrorKind::TooManyAnonymousReferences => "too-many-anonymous",
            ErrorKind::TooManyAutoNumberReferences => "too-many-autonumber",
            ErrorKind::TooManyAutoSymbolReferences => "too-many-autosymbol",
            ErrorKind::UnresolvedReference => "unresolved",
        };
    }
}

/// One entry per invalid element produced during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error category.
    pub kind: ErrorKind,
    /// The message carried by the invalid element.
    pub message: String,
    /// Document containing the invalid element.
    pub path: AbsolutePath,
}

/// A failure found while resolving one node, not yet tied to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl Problem {
    /// Create a problem of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        return Self {
            kind,
            message: message.into(),
        };
    }

    /// Attach the problem to the document at `path`.
    pub fn at(self, path: &AbsolutePath) -> Diagnostic {
        return Diagnostic {
            kind: self.kind,
            message: self.message,
            path: path.clone(),
        };
    }
}

/// Render the diagnostics of a run as markdown, grouped by document.
///
/// Entries keep their run order, which is tree order.
pub fn render_report(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "All references resolved.\n".to_string();
    }

    let mut out = String::new();
    let mut current: Option<&AbsolutePath> = None;
    for diagnostic in diagnostics {
        if current != Some(&diagnostic.path) {
            if current.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "# {}\n", diagnostic.path);
            current = Some(&diagnostic.path);
        }
        let _ = writeln!(out, "- [{}] {}", diagnostic.kind.tag(), diagnostic.message);
    }

    let documents = count_documents(diagnostics);
    let _ = write!(
        out,
        "\n{} problem(s) in {documents} document(s)\n",
        diagnostics.len()
    );
    return out;
}

/// Number of distinct documents among consecutive-grouped diagnostics.
fn count_documents(diagnostics: &[Diagnostic]) -> usize {
    let mut paths: Vec<&AbsolutePath> = diagnostics.iter().map(|d| return &d.path).collect();
    paths.dedup();
    return paths.len();
}

/// Print a rendered report to stdout with bold headings.
pub fn print_report(diagnostics: &[Diagnostic]) {
    print_markdown(&render_report(diagnostics), false);
}

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    print_markdown(&render_error(e), true);
}

/// Print markdown, bolding heading lines.
fn print_markdown(md: &str, to_stderr: bool) {
    for line in md.lines() {
        let styled = if line.starts_with('#') {
            format!("{BOLD}{line}{RESET}")
        } else {
            line.to_string()
        };
        if to_stderr {
            eprintln!("{styled}");
        } else {
            println!("{styled}");
        }
    }
}

/// Render a fatal error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where one exists, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigInvalid { path, reason } => format!(
            "\
# Error: Invalid Configuration

`{}`: {reason}

## Fix

Check the keys documented for `directory.toml` and front matter:
`first_header_as_title`, `target_formats`, `[links.targets]`, `[[links.mappings]]`.
",
            path.display()
        ),
        Error::DirectoryNotFound { path } => format!(
            "\
# Error: Directory Not Found

`{}` does not exist.
",
            path.display()
        ),
        Error::InvalidPath { path, reason } => format!(
            "\
# Error: Invalid Path

`{path}`: {reason}
"
        ),
        Error::ParseFailed { file, reason } => format!(
            "\
# Error: Parse Failed

Could not parse `{}`: {reason}
",
            file.display()
        ),
        Error::TomlDe { path, source } => format!(
            "\
# Error: Invalid TOML

`{}`: {source}
",
            path.display()
        ),
        Error::WatchFailed { reason } => format!(
            "\
# Error: Watch Failed

{reason}
"
        ),
        Error::Io(_) | Error::Json(_) | Error::Pattern(_) | Error::Walk(_) => format!(
            "\
# Error

{e}
"
        ),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic(path: &str, message: &str) -> Diagnostic {
        return Diagnostic {
            kind: ErrorKind::UnresolvedReference,
            message: message.to_string(),
            path: AbsolutePath::parse(path).unwrap(),
        };
    }

    #[test]
    fn empty_report() {
        assert_eq!(render_report(&[]), "All references resolved.\n");
    }

    #[test]
    fn report_groups_by_document() {
        let report = render_report(&[
            diagnostic("/a.md", "unresolved link id reference: x"),
            diagnostic("/a.md", "unresolved link id reference: y"),
            diagnostic("/b.md", "unresolved citation reference: z"),
        ]);
        assert_eq!(report.matches("# /a.md").count(), 1);
        assert!(report.contains("- [unresolved] unresolved citation reference: z"));
        assert!(report.ends_with("3 problem(s) in 2 document(s)\n"));
    }

    #[test]
    fn renders_config_error_with_fix() {
        let rendered = render_error(&Error::ConfigInvalid {
            path: "docs/directory.toml".into(),
            reason: "bad mapping".to_string(),
        });
        assert!(rendered.starts_with("# Error: Invalid Configuration"));
        assert!(rendered.contains("## Fix"));
    }
}
