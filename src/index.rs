//! Target lookup tables.
//!
//! [`DocumentIndex`] maps the identifiers declared in one document to their
//! targets, one namespace per target kind, and remembers which identifiers
//! are declared more than once. [`TreeIndex`] is built once between the two
//! resolution phases and answers cross-document questions read-only.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::{Block, DefinitionTarget, FootnoteLabel, Header};
use crate::config::TargetFormats;
use crate::numbering::FootnoteNumbering;
use crate::path::AbsolutePath;
use crate::tree::DocumentTreeRoot;

/// Lookup result for one identifier in one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<T> {
    /// Declared more than once; every declaration is unusable.
    Duplicate,
    /// Declared exactly once.
    Unique(T),
}

/// Identifiers of one kind declared in a document.
#[derive(Debug, Clone)]
pub struct Namespace<T> {
    /// Entry per identifier.
    entries: HashMap<String, Entry<T>>,
}

impl<T> Default for Namespace<T> {
    fn default() -> Self {
        return Self {
            entries: HashMap::new(),
        };
    }
}

impl<T> Namespace<T> {
    /// Declare `id`; a second declaration marks it duplicate.
    fn declare(&mut self, id: &str, value: T) {
        match self.entries.get_mut(id) {
            Some(entry) => *entry = Entry::Duplicate,
            None => {
                self.entries.insert(id.to_string(), Entry::Unique(value));
            },
        }
    }

    /// Entry for `id`, if declared.
    pub fn get(&self, id: &str) -> Option<&Entry<T>> {
        return self.entries.get(id);
    }

    /// Whether `id` is declared more than once.
    pub fn is_duplicate(&self, id: &str) -> bool {
        return matches!(self.entries.get(id), Some(Entry::Duplicate));
    }
}

/// Destination and title declared by a link definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedTarget {
    /// Where the link points.
    pub target: DefinitionTarget,
    /// Optional title.
    pub title: Option<String>,
}

/// What a named link definition stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDefinitionEntry {
    /// Indirection to another id.
    Alias(String),
    /// A destination.
    Target(DefinedTarget),
}

/// Per-document identifier tables.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    /// Internal link targets and header, section and title ids.
    pub anchors: Namespace<()>,
    /// Anonymous definitions in document order.
    pub anonymous: Vec<DefinedTarget>,
    /// Citation labels.
    pub citations: Namespace<()>,
    /// Numbering of the footnote definitions.
    pub footnotes: FootnoteNumbering,
    /// Labels of labelled auto-number footnotes.
    pub labelled_footnotes: Namespace<()>,
    /// Named link definitions and aliases.
    pub link_definitions: Namespace<LinkDefinitionEntry>,
    /// Explicit footnote numbers.
    pub numeric_footnotes: Namespace<()>,
}

impl DocumentIndex {
    /// Index the targets declared anywhere in `blocks`.
    pub fn build(blocks: &[Block]) -> Self {
        let mut index = Self::default();
        let mut footnote_labels = Vec::new();
        index.visit(blocks, &mut footnote_labels);
        index.footnotes = FootnoteNumbering::assign(&footnote_labels);
        return index;
    }

    /// Record the targets of `blocks`, collecting footnote labels in order.
    fn visit(&mut self, blocks: &[Block], footnote_labels: &mut Vec<FootnoteLabel>) {
        for block in blocks {
            match block {
                Block::Citation(citation) => {
                    self.citations.declare(&citation.label, ());
                    self.visit(&citation.content, footnote_labels);
                },
                Block::FootnoteDefinition(definition) => {
                    match &definition.label {
                        FootnoteLabel::Numeric { number } => {
                            self.numeric_footnotes.declare(&number.to_string(), ());
                        },
                        FootnoteLabel::AutonumberLabel { label } => {
                            self.labelled_footnotes.declare(label, ());
                        },
                        FootnoteLabel::Autonumber | FootnoteLabel::Autosymbol => {},
                    }
                    footnote_labels.push(definition.label.clone());
                    self.visit(&definition.content, footnote_labels);
                },
                Block::Footnote(footnote) => self.visit(&footnote.content, footnote_labels),
                Block::Invalid(invalid) => self.visit(invalid.nested_content(), footnote_labels),
                Block::Header(Header { id: Some(id), .. }) | Block::InternalLinkTarget { id } => {
                    self.anchors.declare(id, ());
                },
                Block::LinkAlias(alias) => {
                    self.link_definitions
                        .declare(&alias.id, LinkDefinitionEntry::Alias(alias.target.clone()));
                },
                Block::LinkDefinition(definition) => {
                    let defined = DefinedTarget {
                        target: definition.target.clone(),
                        title: definition.title.clone(),
                    };
                    if definition.id.is_empty() {
                        self.anonymous.push(defined);
                    } else {
                        self.link_definitions
                            .declare(&definition.id, LinkDefinitionEntry::Target(defined));
                    }
                },
                Block::QuotedBlock { content } => self.visit(content, footnote_labels),
                Block::Section(section) => {
                    if let Some(id) = &section.header.id {
                        self.anchors.declare(id, ());
                    }
                    self.visit(&section.content, footnote_labels);
                },
                Block::Title(title) => {
                    if let Some(id) = &title.id {
                        self.anchors.declare(id, ());
                    }
                },
                Block::CodeBlock { .. }
                | Block::DecoratedHeader(_)
                | Block::Header(_)
                | Block::Opaque { .. }
                | Block::Paragraph { .. }
                | Block::Reference(_)
                | Block::Rule => {},
            }
        }
    }
}

/// What the tree knows about one locally resolved document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    /// Every usable anchor id, including footnote and citation ids.
    pub anchors: BTreeSet<String>,
    /// Output formats the document is enabled for.
    pub formats: TargetFormats,
}

/// Result of a scoped tree-wide anchor search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorLookup {
    /// More than one document in the innermost matching scope declares the id.
    Duplicate(AbsolutePath),
    /// Exactly one document declares the id; the path carries it as fragment.
    Found(AbsolutePath),
    /// No document in any enclosing scope declares the id.
    Missing,
}

/// Tree-wide, read-only view used by the global phase.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    /// Summary per document path.
    documents: BTreeMap<AbsolutePath, DocumentSummary>,
    /// Paths of static documents.
    static_documents: BTreeSet<AbsolutePath>,
}

impl TreeIndex {
    /// Summarize every document of a locally resolved tree.
    pub fn build(root: &DocumentTreeRoot) -> Self {
        let documents = root
            .documents()
            .into_iter()
            .map(|document| {
                let mut anchors = BTreeSet::new();
                collect_anchors(&document.content, &mut anchors);
                let summary = DocumentSummary {
                    anchors,
                    formats: document.config.target_formats.clone(),
                };
                return (document.path.clone(), summary);
            })
            .collect();
        return Self {
            documents,
            static_documents: root.static_documents.iter().cloned().collect(),
        };
    }

    /// Summary of the document at `path` (fragment ignored).
    pub fn document(&self, path: &AbsolutePath) -> Option<&DocumentSummary> {
        return self.documents.get(&path.without_fragment());
    }

    /// Whether `path` names a static document (fragment ignored).
    pub fn is_static(&self, path: &AbsolutePath) -> bool {
        return self.static_documents.contains(&path.without_fragment());
    }

    /// Search the other documents for anchor `id`, starting in the tree of
    /// `from` and widening one enclosing tree at a time up to the root.
    pub fn find_anchor(&self, id: &str, from: &AbsolutePath) -> AnchorLookup {
        let origin = from.without_fragment();
        let mut scope = origin.parent();
        loop {
            let matches: Vec<&AbsolutePath> = self
                .documents
                .iter()
                .filter(|(path, summary)| {
                    return **path != origin && path.is_within(&scope) && summary.anchors.contains(id);
                })
                .map(|(path, _)| return path)
                .collect();

            match matches.as_slice() {
                [single] => return AnchorLookup::Found(single.with_fragment(Some(id))),
                [] => {},
                _ => return AnchorLookup::Duplicate(scope),
            }
            if scope.is_root() {
                return AnchorLookup::Missing;
            }
            scope = scope.parent();
        }
    }
}

/// Gather the usable anchor ids of resolved `blocks`.
fn collect_anchors(blocks: &[Block], anchors: &mut BTreeSet<String>) {
    for block in blocks {
        match block {
            Block::Citation(citation) => {
                if let Some(id) = &citation.id {
                    anchors.insert(id.clone());
                }
                collect_anchors(&citation.content, anchors);
            },
            Block::Footnote(footnote) => {
                anchors.insert(footnote.id.clone());
                collect_anchors(&footnote.content, anchors);
            },
            Block::Header(Header { id: Some(id), .. }) | Block::InternalLinkTarget { id } => {
                anchors.insert(id.clone());
            },
            Block::Invalid(invalid) => collect_anchors(invalid.nested_content(), anchors),
            Block::QuotedBlock { content } => collect_anchors(content, anchors),
            Block::Section(section) => {
                if let Some(id) = &section.header.id {
                    anchors.insert(id.clone());
                }
                collect_anchors(&section.content, anchors);
            },
            Block::Title(title) => {
                if let Some(id) = &title.id {
                    anchors.insert(id.clone());
                }
            },
            _ => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{InvalidBlock, LinkAlias, LinkDefinition, Section};
    use crate::config::Config;
    use crate::diagnostics::ErrorKind;
    use crate::tree::{Document, DocumentTree, TreeContent};

    fn abs(raw: &str) -> AbsolutePath {
        return AbsolutePath::parse(raw).unwrap();
    }

    fn anchor(id: &str) -> Block {
        return Block::InternalLinkTarget { id: id.to_string() };
    }

    fn definition(id: &str, url: &str) -> Block {
        return Block::LinkDefinition(LinkDefinition {
            id: id.to_string(),
            target: DefinitionTarget::External { url: url.to_string() },
            title: None,
        });
    }

    #[test]
    fn repeated_anchor_is_duplicate() {
        let index = DocumentIndex::build(&[anchor("a"), anchor("a"), anchor("b")]);
        assert!(index.anchors.is_duplicate("a"));
        assert_eq!(index.anchors.get("b"), Some(&Entry::Unique(())));
    }

    #[test]
    fn alias_and_definition_share_a_namespace() {
        let index = DocumentIndex::build(&[
            definition("x", "http://a"),
            Block::LinkAlias(LinkAlias {
                id: "x".to_string(),
                target: "y".to_string(),
            }),
        ]);
        assert!(index.link_definitions.is_duplicate("x"));
    }

    #[test]
    fn anonymous_definitions_are_positional() {
        let index = DocumentIndex::build(&[definition("", "http://a"), definition("", "http://b")]);
        assert_eq!(index.anonymous.len(), 2);
        assert!(index.link_definitions.get("").is_none());
    }

    #[test]
    fn section_ids_are_anchors() {
        let section = Block::Section(Section {
            content: vec![anchor("inner")],
            header: Header {
                content: Vec::new(),
                id: Some("outer".to_string()),
                level: 1,
            },
        });
        let index = DocumentIndex::build(&[section]);
        assert!(index.anchors.get("outer").is_some());
        assert!(index.anchors.get("inner").is_some());
    }

    #[test]
    fn invalid_section_keeps_nested_anchors_only() {
        let invalid = Block::Invalid(InvalidBlock {
            fallback: Box::new(Block::Section(Section {
                content: vec![anchor("inner")],
                header: Header {
                    content: Vec::new(),
                    id: Some("dup".to_string()),
                    level: 1,
                },
            })),
            kind: ErrorKind::DuplicateIdentifier,
            message: "More than one link target with id 'dup' in path /a.md".to_string(),
        });
        let mut tree = DocumentTree::new(AbsolutePath::root(), Config::default());
        tree.content.push(TreeContent::Document(Document::new(
            abs("/a.md"),
            vec![invalid.clone()],
            Config::default(),
        )));
        let index = TreeIndex::build(&DocumentTreeRoot::new(tree));
        let anchors = &index.document(&abs("/a.md")).unwrap().anchors;
        assert!(anchors.contains("inner"));
        assert!(!anchors.contains("dup"));

        let local = DocumentIndex::build(&[invalid]);
        assert!(local.anchors.get("inner").is_some());
        assert!(local.anchors.get("dup").is_none());
    }

    fn tree_with(docs: &[(&str, &str)]) -> TreeIndex {
        let mut tree = DocumentTree::new(AbsolutePath::root(), Config::default());
        for (path, id) in docs {
            tree.content.push(TreeContent::Document(Document::new(
                abs(path),
                vec![anchor(id)],
                Config::default(),
            )));
        }
        return TreeIndex::build(&DocumentTreeRoot::new(tree));
    }

    #[test]
    fn nearest_scope_wins() {
        let index = tree_with(&[("/a/one.md", "x"), ("/b/two.md", "x"), ("/a/ref.md", "y")]);
        assert_eq!(
            index.find_anchor("x", &abs("/a/ref.md")),
            AnchorLookup::Found(abs("/a/one.md#x"))
        );
    }

    #[test]
    fn ambiguous_scope_is_duplicate() {
        let index = tree_with(&[("/a/one.md", "x"), ("/b/two.md", "x"), ("/c/ref.md", "y")]);
        assert_eq!(
            index.find_anchor("x", &abs("/c/ref.md")),
            AnchorLookup::Duplicate(AbsolutePath::root())
        );
        assert_eq!(index.find_anchor("z", &abs("/c/ref.md")), AnchorLookup::Missing);
    }
}
