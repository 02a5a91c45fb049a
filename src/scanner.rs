//! Directory scanning: a directory of markdown files becomes a document tree.
//!
//! Every directory is a tree and carries an optional `directory.toml` layer.
//! `title.md` introduces its tree, `cover.md` at the top level is the cover,
//! any other `.md` file is a document and every other file is a static
//! document that links may target. Hidden entries are skipped.

use std::path::Path as FsPath;

use tracing::debug;
use walkdir::WalkDir;

use crate::config::{Config, ConfigLayer, DIRECTORY_CONFIG};
use crate::error::Error;
use crate::markdown::{MarkdownParser, split_front_matter};
use crate::path::AbsolutePath;
use crate::tree::{Document, DocumentTree, DocumentTreeRoot, TreeContent};

/// Markdown file that introduces its directory's tree.
const TITLE_DOCUMENT: &str = "title.md";

/// Markdown file at the top level used as cover.
const COVER_DOCUMENT: &str = "cover.md";

/// Scan `dir` into a document tree rooted at `/`.
///
/// # Errors
///
/// Returns `Error::DirectoryNotFound` if `dir` is not a directory, and
/// propagates walk, I/O, configuration and parse errors.
pub fn scan(dir: &FsPath, parser: &MarkdownParser) -> Result<DocumentTreeRoot, Error> {
    if !dir.is_dir() {
        return Err(Error::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut statics = Vec::new();
    let mut cover = None;
    let mut tree = scan_tree(dir, &AbsolutePath::root(), &Config::default(), parser, &mut statics)?;

    if let Some(position) = tree.content.iter().position(|child| {
        return matches!(child, TreeContent::Document(doc) if doc.path.name() == Some(COVER_DOCUMENT));
    }) && let TreeContent::Document(doc) = tree.content.remove(position)
    {
        cover = Some(doc);
    }

    debug!(static_documents = statics.len(), "scan finished");
    return Ok(DocumentTreeRoot {
        cover,
        static_documents: statics,
        tree,
    });
}

/// Scan one directory into a tree at `path`, merging its layer over `parent`.
///
/// # Errors
///
/// Propagates walk, I/O, configuration and parse errors.
fn scan_tree(
    dir: &FsPath,
    path: &AbsolutePath,
    parent: &Config,
    parser: &MarkdownParser,
    statics: &mut Vec<AbsolutePath>,
) -> Result<DocumentTree, Error> {
    let config = ConfigLayer::load(dir)?.apply(parent, path, &dir.join(DIRECTORY_CONFIG))?;
    let mut tree = DocumentTree::new(path.clone(), config);

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if name.starts_with('.') || name == DIRECTORY_CONFIG {
            continue;
        }
        let child_path = path.join(name);

        if entry.file_type().is_dir() {
            let child = scan_tree(entry.path(), &child_path, &tree.config, parser, statics)?;
            tree.content.push(TreeContent::Tree(child));
            continue;
        }
        if entry.path().extension().is_none_or(|ext| return ext != "md") {
            statics.push(child_path);
            continue;
        }

        let document = load_document(entry.path(), child_path, &tree.config, path, parser)?;
        if name == TITLE_DOCUMENT {
            tree.title_document = Some(document);
        } else {
            tree.content.push(TreeContent::Document(document));
        }
    }

    return Ok(tree);
}

/// Read and parse one markdown file, applying its front matter over the tree config.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read, configuration errors for
/// malformed front matter, and `Error::ParseFailed` if parsing fails.
fn load_document(
    file: &FsPath,
    path: AbsolutePath,
    tree_config: &Config,
    tree_path: &AbsolutePath,
    parser: &MarkdownParser,
) -> Result<Document, Error> {
    let source = std::fs::read_to_string(file)?;
    let (front_matter, body) = split_front_matter(&source);
    let config = match front_matter {
        Some(front) => ConfigLayer::parse(front, file)?.apply(tree_config, tree_path, file)?,
        None => tree_config.clone(),
    };
    let content = parser.parse(file, body)?;
    debug!(document = %path, blocks = content.len(), "loaded");
    return Ok(Document::new(path, content, config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetFormats;

    fn write(dir: &FsPath, relative: &str, content: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn builds_tree_with_title_cover_and_statics() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "cover.md", "# Cover\n");
        write(tmp.path(), "intro.md", "# Intro\n");
        write(tmp.path(), "guide/title.md", "# Guide\n");
        write(tmp.path(), "guide/setup.md", "# Setup\n");
        write(tmp.path(), "guide/diagram.png", "png");
        write(tmp.path(), ".hidden/skip.md", "# Skip\n");

        let parser = MarkdownParser::new().unwrap();
        let root = scan(tmp.path(), &parser).unwrap();

        let paths: Vec<String> = root.documents().iter().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, ["/cover.md", "/guide/title.md", "/guide/setup.md", "/intro.md"]);
        assert_eq!(root.static_documents, [AbsolutePath::parse("/guide/diagram.png").unwrap()]);
    }

    #[test]
    fn directory_and_front_matter_layers_merge() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "directory.toml", "first_header_as_title = true\n");
        write(tmp.path(), "pdf/directory.toml", "target_formats = [\"pdf\"]\n");
        write(tmp.path(), "pdf/a.md", "+++\nfirst_header_as_title = false\n+++\n# A\n");

        let parser = MarkdownParser::new().unwrap();
        let root = scan(tmp.path(), &parser).unwrap();
        let doc = root.document(&AbsolutePath::parse("/pdf/a.md").unwrap()).unwrap();

        assert!(!doc.config.first_header_as_title);
        assert_eq!(doc.config.target_formats.describe(), "[pdf]");
        assert_eq!(root.tree.config.target_formats, TargetFormats::All);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let parser = MarkdownParser::new().unwrap();
        let result = scan(FsPath::new("/definitely/not/here"), &parser);
        assert!(matches!(result, Err(Error::DirectoryNotFound { .. })));
    }
}
