//! Documents and the trees that hold them.

use serde::Serialize;

use crate::ast::{Block, Title};
use crate::config::Config;
use crate::path::AbsolutePath;

/// One markup document: its AST, virtual path, and effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Effective configuration (own layer merged over ancestors).
    #[serde(skip)]
    pub config: Config,
    /// Top-level blocks.
    pub content: Vec<Block>,
    /// Virtual path of the document.
    pub path: AbsolutePath,
}

/// Child of a tree: a document or a nested tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeContent {
    /// A document.
    Document(Document),
    /// A nested tree.
    Tree(DocumentTree),
}

/// Ordered tree of documents and sub-trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTree {
    /// Effective configuration of the tree.
    #[serde(skip)]
    pub config: Config,
    /// Children in order.
    pub content: Vec<TreeContent>,
    /// Virtual path of the tree.
    pub path: AbsolutePath,
    /// Optional document introducing the tree.
    pub title_document: Option<Document>,
}

/// The top-level tree plus tree-wide assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTreeRoot {
    /// Optional cover document.
    pub cover: Option<Document>,
    /// Paths of non-markup documents (images, downloads) that links may target.
    pub static_documents: Vec<AbsolutePath>,
    /// The top-level tree.
    pub tree: DocumentTree,
}

impl Document {
    /// Create a document.
    pub const fn new(path: AbsolutePath, content: Vec<Block>, config: Config) -> Self {
        return Self {
            config,
            content,
            path,
        };
    }

    /// The extracted title, if the document has one.
    pub fn title(&self) -> Option<&Title> {
        return self.content.iter().find_map(|block| {
            return match block {
                Block::Title(title) => Some(title),
                _ => None,
            };
        });
    }

    /// Empty stand-in holding only the path, used while documents are detached.
    fn placeholder(path: &AbsolutePath) -> Self {
        return Self::new(path.clone(), Vec::new(), Config::default());
    }
}

impl DocumentTree {
    /// Create an empty tree at `path`.
    pub const fn new(path: AbsolutePath, config: Config) -> Self {
        return Self {
            config,
            content: Vec::new(),
            path,
            title_document: None,
        };
    }

    /// Documents in tree order: title document first, then children depth-first.
    pub fn documents(&self) -> Vec<&Document> {
        let mut out = Vec::new();
        self.collect_documents(&mut out);
        return out;
    }

    /// Append documents in tree order to `out`.
    fn collect_documents<'a>(&'a self, out: &mut Vec<&'a Document>) {
        if let Some(title) = &self.title_document {
            out.push(title);
        }
        for child in &self.content {
            match child {
                TreeContent::Document(doc) => out.push(doc),
                TreeContent::Tree(tree) => tree.collect_documents(out),
            }
        }
    }

    /// Rebuild the tree, passing every document through `f` in tree order.
    pub fn map_documents<F>(self, f: &mut F) -> Self
    where
        F: FnMut(Document) -> Document,
    {
        let title_document = self.title_document.map(&mut *f);
        let content = self
            .content
            .into_iter()
            .map(|child| {
                return match child {
                    TreeContent::Document(doc) => TreeContent::Document(f(doc)),
                    TreeContent::Tree(tree) => TreeContent::Tree(tree.map_documents(&mut *f)),
                };
            })
            .collect();
        return Self {
            config: self.config,
            content,
            path: self.path,
            title_document,
        };
    }
}

impl DocumentTreeRoot {
    /// Wrap a tree without cover or static documents.
    pub const fn new(tree: DocumentTree) -> Self {
        return Self {
            cover: None,
            static_documents: Vec::new(),
            tree,
        };
    }

    /// Every document in tree order, cover first.
    pub fn documents(&self) -> Vec<&Document> {
        let mut out: Vec<&Document> = self.cover.iter().collect();
        out.extend(self.tree.documents());
        return out;
    }

    /// Find a document by path (fragment ignored).
    pub fn document(&self, path: &AbsolutePath) -> Option<&Document> {
        let wanted = path.without_fragment();
        return self.documents().into_iter().find(|doc| return doc.path == wanted);
    }

    /// Rebuild the root, passing every document through `f` in tree order.
    pub fn map_documents<F>(self, f: &mut F) -> Self
    where
        F: FnMut(Document) -> Document,
    {
        let cover = self.cover.map(&mut *f);
        return Self {
            cover,
            static_documents: self.static_documents,
            tree: self.tree.map_documents(&mut *f),
        };
    }

    /// Move every document out in tree order, leaving placeholders behind.
    pub fn detach_documents(self) -> (Self, Vec<Document>) {
        let mut detached = Vec::new();
        let skeleton = self.map_documents(&mut |doc: Document| {
            let placeholder = Document::placeholder(&doc.path);
            detached.push(doc);
            return placeholder;
        });
        return (skeleton, detached);
    }

    /// Put documents back in tree order, replacing the placeholders left by
    /// [`DocumentTreeRoot::detach_documents`]. Surplus documents are ignored;
    /// missing ones leave the placeholder in place.
    pub fn attach_documents(self, documents: Vec<Document>) -> Self {
        let mut replacements = documents.into_iter();
        return self.map_documents(&mut |placeholder: Document| {
            return replacements.next().unwrap_or(placeholder);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str) -> Document {
        return Document::new(
            AbsolutePath::parse(path).unwrap(),
            vec![Block::paragraph(path)],
            Config::default(),
        );
    }

    fn sample() -> DocumentTreeRoot {
        let mut sub = DocumentTree::new(AbsolutePath::parse("/sub").unwrap(), Config::default());
        sub.title_document = Some(doc("/sub/title.md"));
        sub.content.push(TreeContent::Document(doc("/sub/b.md")));

        let mut tree = DocumentTree::new(AbsolutePath::root(), Config::default());
        tree.content.push(TreeContent::Document(doc("/a.md")));
        tree.content.push(TreeContent::Tree(sub));

        let mut root = DocumentTreeRoot::new(tree);
        root.cover = Some(doc("/cover.md"));
        return root;
    }

    #[test]
    fn documents_in_tree_order() {
        let root = sample();
        let paths: Vec<String> = root.documents().iter().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, ["/cover.md", "/a.md", "/sub/title.md", "/sub/b.md"]);
    }

    #[test]
    fn detach_then_attach_restores_tree() {
        let original = sample();
        let (skeleton, docs) = original.clone().detach_documents();
        assert_eq!(docs.len(), 4);
        assert!(skeleton.documents().iter().all(|d| d.content.is_empty()));
        assert_eq!(skeleton.attach_documents(docs), original);
    }

    #[test]
    fn finds_document_ignoring_fragment() {
        let root = sample();
        let path = AbsolutePath::parse("/sub/b.md#x").unwrap();
        assert!(root.document(&path).is_some());
    }
}
