//! Document AST: block and span nodes, the unresolved references a markup
//! grammar produces, and the resolved or invalid nodes that replace them.
//!
//! Every category is a closed enum. Node kinds the resolver does not
//! understand travel through untouched as `Opaque`.

use serde::{Deserialize, Serialize};

use crate::diagnostics::ErrorKind;
use crate::path::{AbsolutePath, Path, RelativePath};

/// A block-level node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// A citation target; `id` is assigned during resolution.
    Citation(Citation),
    /// Preformatted code, never inspected.
    CodeBlock {
        /// Verbatim code.
        code: String,
        /// Info string of a fenced block.
        language: Option<String>,
    },
    /// A header whose level is implied by its decoration.
    DecoratedHeader(DecoratedHeader),
    /// A footnote with its final id and display label.
    Footnote(Footnote),
    /// An unresolved footnote definition.
    FootnoteDefinition(FootnoteDefinition),
    /// A header with an explicit level.
    Header(Header),
    /// An explicit anchor.
    InternalLinkTarget {
        /// Anchor identifier.
        id: String,
    },
    /// Replacement for an unusable target.
    Invalid(InvalidBlock),
    /// Named indirection to another link id.
    LinkAlias(LinkAlias),
    /// Named (or anonymous) link destination.
    LinkDefinition(LinkDefinition),
    /// A node kind the resolver passes through.
    Opaque {
        /// Verbatim source of the node.
        content: String,
        /// Grammar-specific node kind.
        kind: String,
    },
    /// Running text.
    Paragraph {
        /// Inline content.
        content: Vec<Span>,
    },
    /// Quoted container.
    QuotedBlock {
        /// Nested blocks.
        content: Vec<Block>,
    },
    /// A reference standing on its own as a block, such as an image.
    Reference(Reference),
    /// Thematic break.
    Rule,
    /// A header together with the blocks nested under it.
    Section(Section),
    /// The promoted first header of a document.
    Title(Title),
}

/// An inline node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Span {
    /// Resolved citation reference.
    CitationLink {
        /// Display label.
        label: String,
        /// Label of the cited target.
        reference: String,
    },
    /// Emphasized inline content.
    Emphasized {
        /// Nested spans.
        content: Vec<Span>,
    },
    /// Resolved footnote reference.
    FootnoteLink {
        /// Id of the footnote block.
        id: String,
        /// Display label of the footnote.
        label: String,
    },
    /// Resolved image.
    Image(Image),
    /// Replacement for an unsatisfiable reference.
    Invalid(InvalidSpan),
    /// Resolved link.
    Link(Link),
    /// Inline code.
    Literal {
        /// Verbatim code.
        text: String,
    },
    /// A node kind the resolver passes through.
    Opaque {
        /// Verbatim source of the node.
        content: String,
        /// Grammar-specific node kind.
        kind: String,
    },
    /// An unresolved reference.
    Reference(Reference),
    /// Strongly emphasized inline content.
    Strong {
        /// Nested spans.
        content: Vec<Span>,
    },
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// An unresolved reference plus the literal markup it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// What is being referenced.
    pub kind: ReferenceKind,
    /// Source text, used as the rendering fallback when resolution fails.
    pub source: String,
}

/// The kinds of references the resolver rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reference", rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `[@label]`
    Citation {
        /// Citation label.
        label: String,
    },
    /// `[^1]`, `[^#]`, `[^#label]`, `[^*]`
    Footnote {
        /// Numbering scheme and label.
        label: FootnoteLabel,
    },
    /// Image by link id.
    ImageId {
        /// Alternative text.
        alt: String,
        /// Link id; empty for an anonymous reference.
        id: String,
    },
    /// Image by path.
    ImagePath {
        /// Alternative text.
        alt: String,
        /// Path as written.
        path: Path,
        /// Optional title.
        title: Option<String>,
    },
    /// Link by id; empty for an anonymous reference.
    LinkId {
        /// Link text.
        content: Vec<Span>,
        /// Link id.
        id: String,
    },
    /// Link by path.
    LinkPath {
        /// Link text.
        content: Vec<Span>,
        /// Path as written.
        path: Path,
        /// Optional title.
        title: Option<String>,
    },
}

/// How a footnote is labelled and numbered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FootnoteLabel {
    /// Numbered in order of appearance.
    Autonumber,
    /// Numbered in order of appearance, matched by label.
    AutonumberLabel {
        /// Label text.
        label: String,
    },
    /// Assigned a symbol in order of appearance.
    Autosymbol,
    /// Explicit number.
    Numeric {
        /// The number.
        number: u32,
    },
}

/// Header with an explicit level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header text.
    pub content: Vec<Span>,
    /// Explicit or derived anchor id.
    pub id: Option<String>,
    /// Nesting level, 1 for the outermost.
    pub level: usize,
}

/// Header carrying a decoration instead of a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedHeader {
    /// Header text.
    pub content: Vec<Span>,
    /// Decoration that implies the level.
    pub decoration: Decoration,
    /// Explicit anchor id.
    pub id: Option<String>,
}

/// Underline (and optional overline) marker of a decorated header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decoration {
    /// Whether the header text is also overlined.
    pub overline: bool,
    /// Repeated marker character.
    pub symbol: char,
}

/// A header plus the content nested beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Nested blocks and sections.
    pub content: Vec<Block>,
    /// The section's header.
    pub header: Header,
}

/// Document title extracted from the first header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    /// Title text.
    pub content: Vec<Span>,
    /// Anchor id.
    pub id: Option<String>,
}

/// Citation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Citation body.
    pub content: Vec<Block>,
    /// Rendered id, `__cit-<label>` once resolved.
    pub id: Option<String>,
    /// Label matched by references.
    pub label: String,
}

/// Unresolved footnote definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootnoteDefinition {
    /// Footnote body.
    pub content: Vec<Block>,
    /// Numbering scheme and label.
    pub label: FootnoteLabel,
}

/// Footnote with final id and display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footnote {
    /// Footnote body.
    pub content: Vec<Block>,
    /// Rendered id.
    pub id: String,
    /// Display label (number or symbol).
    pub label: String,
}

/// Link destination declared in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDefinition {
    /// Link id; empty for an anonymous definition.
    pub id: String,
    /// Where the link points.
    pub target: DefinitionTarget,
    /// Optional title.
    pub title: Option<String>,
}

/// Destination of a link definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefinitionTarget {
    /// External URL.
    External {
        /// The URL.
        url: String,
    },
    /// Virtual path, relative to the declaring document.
    Internal {
        /// The path as written.
        path: Path,
    },
}

/// Named indirection: references to `id` resolve as references to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAlias {
    /// The alias name.
    pub id: String,
    /// The id it stands for.
    pub target: String,
}

/// Resolved link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link text.
    pub content: Vec<Span>,
    /// Finalized destination.
    pub target: Target,
    /// Optional title.
    pub title: Option<String>,
}

/// Resolved image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Alternative text.
    pub alt: String,
    /// Finalized source.
    pub target: Target,
    /// Optional title.
    pub title: Option<String>,
}

/// Finalized destination of a link or image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// A URL outside the document tree.
    External {
        /// The URL or literal path.
        url: String,
    },
    /// A location inside the document tree.
    Internal(InternalTarget),
}

/// Location inside the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTarget {
    /// Absolute path including fragment.
    pub absolute: AbsolutePath,
    /// URL to use instead of the internal path, from a configured mapping.
    pub external_url: Option<String>,
    /// Path relative to the referencing document.
    pub relative: RelativePath,
}

/// Placeholder for a target that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidBlock {
    /// The original node, rendered when the placeholder is not.
    pub fallback: Box<Block>,
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

/// Placeholder for a reference that cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidSpan {
    /// The original node, rendered when the placeholder is not.
    pub fallback: Box<Span>,
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl Span {
    /// Plain text span.
    pub fn text(text: impl Into<String>) -> Self {
        return Span::Text { text: text.into() };
    }
}

impl Block {
    /// Paragraph of a single text span.
    pub fn paragraph(text: impl Into<String>) -> Self {
        return Block::Paragraph {
            content: vec![Span::text(text)],
        };
    }
}

impl Reference {
    /// Reference with its literal source text.
    pub fn new(kind: ReferenceKind, source: impl Into<String>) -> Self {
        return Self {
            kind,
            source: source.into(),
        };
    }
}

impl InvalidBlock {
    /// Blocks nested in the invalidated node. They keep their own targets
    /// even though the node's own id is unusable.
    pub fn nested_content(&self) -> &[Block] {
        return match self.fallback.as_ref() {
            Block::Citation(Citation { content, .. })
            | Block::Footnote(Footnote { content, .. })
            | Block::FootnoteDefinition(FootnoteDefinition { content, .. })
            | Block::QuotedBlock { content }
            | Block::Section(Section { content, .. }) => content,
            _ => &[],
        };
    }
}

impl InvalidSpan {
    /// Text a renderer shows in place of the failed node.
    pub fn fallback_text(&self) -> String {
        return match self.fallback.as_ref() {
            Span::Reference(reference) => reference.source.clone(),
            other => plain_text(std::slice::from_ref(other)),
        };
    }
}

/// Concatenate the textual content of spans, ignoring markup.
pub fn plain_text(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        collect_text(span, &mut out);
    }
    return out;
}

/// Append the text of one span to `out`.
fn collect_text(span: &Span, out: &mut String) {
    match span {
        Span::Text { text } | Span::Literal { text } => out.push_str(text),
        Span::Emphasized { content } | Span::Strong { content } => {
            for child in content {
                collect_text(child, out);
            }
        },
        Span::Link(link) => {
            for child in &link.content {
                collect_text(child, out);
            }
        },
        Span::Image(image) => out.push_str(&image.alt),
        Span::Reference(reference) => out.push_str(&reference.source),
        Span::Invalid(invalid) => out.push_str(&invalid.fallback_text()),
        Span::CitationLink { label, .. } | Span::FootnoteLink { label, .. } => {
            out.push_str(label);
        },
        Span::Opaque { content, .. } => out.push_str(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_flattens_markup() {
        let spans = vec![
            Span::text("Getting "),
            Span::Strong {
                content: vec![Span::text("Started")],
            },
        ];
        assert_eq!(plain_text(&spans), "Getting Started");
    }

    #[test]
    fn invalid_span_falls_back_to_source() {
        let invalid = InvalidSpan {
            fallback: Box::new(Span::Reference(Reference::new(
                ReferenceKind::Citation {
                    label: "knuth".to_string(),
                },
                "[@knuth]",
            ))),
            kind: ErrorKind::UnresolvedReference,
            message: "unresolved citation reference: knuth".to_string(),
        };
        assert_eq!(invalid.fallback_text(), "[@knuth]");
    }

    #[test]
    fn blocks_serialize_with_type_tag() {
        let json = serde_json::to_value(Block::paragraph("hi")).unwrap();
        assert_eq!(json["type"], "paragraph");
        assert_eq!(json["content"][0]["type"], "text");
    }
}
