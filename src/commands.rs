//! CLI command bodies: resolve, check, outline.

use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;

use serde::Serialize;

use crate::ast::{Block, plain_text};
use crate::diagnostics::{self, Diagnostic};
use crate::error::Error;
use crate::markdown::MarkdownParser;
use crate::resolver::{self, Resolution};
use crate::scanner;
use crate::tree::DocumentTreeRoot;

/// Machine-readable output of `resolve --json`.
#[derive(Serialize)]
struct JsonOutput<'a> {
    /// Diagnostics in tree order.
    diagnostics: &'a [Diagnostic],
    /// The resolved tree.
    root: &'a DocumentTreeRoot,
}

/// Scan `dir` and resolve every reference in it.
///
/// # Errors
///
/// Returns scanning, configuration and parse errors.
pub fn load_and_resolve(dir: &Path) -> Result<Resolution, Error> {
    let parser = MarkdownParser::new()?;
    let root = scanner::scan(dir, &parser)?;
    return Ok(resolver::resolve(root));
}

/// Resolve `dir` and print the diagnostics report, or the resolved tree as JSON.
/// With `output`, the result is written to that file instead of stdout.
///
/// # Errors
///
/// Returns scanning errors, `Error::Json` if serialization fails, and
/// `Error::Io` if the output file cannot be written.
pub fn resolve(dir: &Path, json: bool, output: Option<&Path>) -> Result<ExitCode, Error> {
    let resolution = load_and_resolve(dir)?;

    let rendered = if json {
        let mut text = serde_json::to_string_pretty(&JsonOutput {
            diagnostics: &resolution.diagnostics,
            root: &resolution.root,
        })?;
        text.push('\n');
        text
    } else {
        diagnostics::render_report(&resolution.diagnostics)
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!("Wrote {}", path.display());
        },
        None if json => print!("{rendered}"),
        None => diagnostics::print_report(&resolution.diagnostics),
    }
    return Ok(ExitCode::SUCCESS);
}

/// Resolve `dir` and report problems.
///
/// Exit code 0 when every reference resolved, 1 when any diagnostic exists.
///
/// # Errors
///
/// Returns scanning, configuration and parse errors.
pub fn check(dir: &Path) -> Result<ExitCode, Error> {
    let resolution = load_and_resolve(dir)?;
    diagnostics::print_report(&resolution.diagnostics);
    if resolution.diagnostics.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    return Ok(ExitCode::from(1));
}

/// Resolve `dir` and print every document's title and section outline.
///
/// # Errors
///
/// Returns scanning, configuration and parse errors.
pub fn outline(dir: &Path) -> Result<(), Error> {
    let resolution = load_and_resolve(dir)?;
    print!("{}", render_outline(&resolution.root));
    return Ok(());
}

/// Render the outline of every document as a markdown list.
pub fn render_outline(root: &DocumentTreeRoot) -> String {
    let mut out = String::new();
    for document in root.documents() {
        let _ = writeln!(out, "# {}", document.path);
        if let Some(title) = document.title() {
            let _ = writeln!(out, "\n{}", plain_text(&title.content));
        }
        out.push('\n');
        render_sections(&document.content, 0, &mut out);
        out.push('\n');
    }
    return out;
}

/// Append one list line per section, indented by depth.
fn render_sections(blocks: &[Block], depth: usize, out: &mut String) {
    for block in blocks {
        let Block::Section(section) = block else {
            continue;
        };
        let indent = "  ".repeat(depth);
        let text = plain_text(&section.header.content);
        match &section.header.id {
            Some(id) => {
                let _ = writeln!(out, "{indent}- {text} (#{id})");
            },
            None => {
                let _ = writeln!(out, "{indent}- {text}");
            },
        }
        render_sections(&section.content, depth.saturating_add(1), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Header, Section, Span, Title};
    use crate::config::Config;
    use crate::path::AbsolutePath;
    use crate::tree::{Document, DocumentTree, TreeContent};

    fn section(text: &str, id: &str, content: Vec<Block>) -> Block {
        return Block::Section(Section {
            content,
            header: Header {
                content: vec![Span::text(text)],
                id: Some(id.to_string()),
                level: 1,
            },
        });
    }

    #[test]
    fn outline_lists_nested_sections() {
        let content = vec![
            Block::Title(Title {
                content: vec![Span::text("Guide")],
                id: Some("guide".to_string()),
            }),
            section("Setup", "setup", vec![section("Linux", "linux", Vec::new())]),
        ];
        let mut tree = DocumentTree::new(AbsolutePath::root(), Config::default());
        tree.content.push(TreeContent::Document(Document::new(
            AbsolutePath::parse("/guide.md").unwrap(),
            content,
            Config::default(),
        )));

        let rendered = render_outline(&DocumentTreeRoot::new(tree));
        assert!(rendered.starts_with("# /guide.md\n\nGuide\n"));
        assert!(rendered.contains("- Setup (#setup)\n  - Linux (#linux)\n"));
    }
}
