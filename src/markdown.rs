//! Markdown loader: tree-sitter-md for block structure, regex for inline
//! references and the paragraph forms markdown has no block syntax for.

use std::path::Path as FsPath;

use regex::{Captures, Regex};
use tree_sitter::{Language, Node, Parser};

use crate::ast::{
    Block, Citation, DecoratedHeader, Decoration, DefinitionTarget, FootnoteDefinition, FootnoteLabel, Header, Link,
    LinkAlias, LinkDefinition, Reference, ReferenceKind, Span, Target, plain_text,
};
use crate::error::Error;
use crate::path::{Path, is_external_url};

/// Delimiter line around TOML front matter.
const FRONT_MATTER_FENCE: &str = "+++";

/// Inline syntax, tried left to right at each position.
const INLINE_PATTERN: &str = r#"(?x)
    !\[(?P<image_id_alt>[^\]]*)\]\[(?P<image_id>[^\]]*)\]
  | !\[(?P<image_alt>[^\]]*)\]\((?P<image_dest>[^)\s]+)(?:\s+"(?P<image_title>[^"]*)")?\)
  | \[@(?P<cite>[^\]\s]+)\]
  | \[\^(?P<footnote>[^\]\s]+)\]
  | \[(?P<link_id_text>[^\]]+)\]\[(?P<link_id>[^\]]*)\]
  | \[(?P<link_text>[^\]]+)\]\((?P<link_dest>[^)\s]+)(?:\s+"(?P<link_title>[^"]*)")?\)
  | \*\*(?P<strong>[^*]+)\*\*
  | \*(?P<em>[^*]+)\*
  | `(?P<code>[^`]+)`
"#;

/// Parses markdown sources into document blocks.
///
/// Holds only compiled patterns and the grammar, so one instance can be
/// shared across threads; each call creates its own tree-sitter parser.
pub struct MarkdownParser {
    /// `[@label]: text` paragraph.
    citation: Regex,
    /// `[^label]: text` paragraph.
    footnote: Regex,
    /// Trailing `{#id}` on a heading.
    heading_id: Regex,
    /// Inline references and markup.
    inline: Regex,
    /// Block grammar.
    language: Language,
    /// `{#id}` standing alone.
    standalone_anchor: Regex,
}

impl MarkdownParser {
    /// Compile the patterns and load the grammar.
    ///
    /// # Errors
    ///
    /// Returns `Error::Pattern` if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, Error> {
        return Ok(Self {
            citation: Regex::new(r"(?s)\A\[@([^\]\s]+)\]:\s*(.*)\z")?,
            footnote: Regex::new(r"(?s)\A\[\^([^\]\s]+)\]:\s*(.*)\z")?,
            heading_id: Regex::new(r"\s*\{#([^}\s]+)\}\s*\z")?,
            inline: Regex::new(INLINE_PATTERN)?,
            language: tree_sitter_md::LANGUAGE.into(),
            standalone_anchor: Regex::new(r"\A\{#([^}\s]+)\}\z")?,
        });
    }

    /// Parse one markdown source (front matter already removed).
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseFailed` if the grammar cannot be loaded or parsing fails.
    pub fn parse(&self, file: &FsPath, source: &str) -> Result<Vec<Block>, Error> {
        let mut parser = Parser::new();
        parser.set_language(&self.language).map_err(|e| {
            return Error::ParseFailed {
                file: file.to_path_buf(),
                reason: e.to_string(),
            };
        })?;
        let tree = parser.parse(source, None).ok_or_else(|| {
            return Error::ParseFailed {
                file: file.to_path_buf(),
                reason: "tree-sitter returned None".to_string(),
            };
        })?;

        let mut blocks = Vec::new();
        self.collect_blocks(tree.root_node(), source, 0, &mut blocks);
        return Ok(blocks);
    }

    /// Convert the block children of `node`, flattening sections.
    fn collect_blocks(&self, node: Node<'_>, source: &str, quote_depth: usize, out: &mut Vec<Block>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "section" | "document" => self.collect_blocks(child, source, quote_depth, out),
                "block_continuation" | "block_quote_marker" => {},
                _ => {
                    if let Some(block) = self.convert_block(child, source, quote_depth) {
                        out.push(block);
                    }
                },
            }
        }
    }

    /// Convert one block node; `None` for nodes with no content.
    fn convert_block(&self, node: Node<'_>, source: &str, quote_depth: usize) -> Option<Block> {
        let text = node_text(node, source);
        return match node.kind() {
            "atx_heading" => Some(self.atx_heading(node, source)),
            "block_quote" => {
                let mut content = Vec::new();
                self.collect_blocks(node, source, quote_depth.saturating_add(1), &mut content);
                Some(Block::QuotedBlock { content })
            },
            "fenced_code_block" => Some(fenced_code(node, source)),
            "indented_code_block" => Some(Block::CodeBlock {
                code: unindent(text),
                language: None,
            }),
            "link_reference_definition" => Some(self.link_reference_definition(node, source)),
            "paragraph" => {
                let text = strip_quote_markers(text, quote_depth);
                if text.trim().is_empty() {
                    return None;
                }
                Some(self.paragraph(text.trim()))
            },
            "setext_heading" => Some(self.setext_heading(node, source)),
            "thematic_break" => Some(Block::Rule),
            kind => Some(Block::Opaque {
                content: text.to_string(),
                kind: kind.to_string(),
            }),
        };
    }

    /// `## Text {#id}` to a leveled header.
    fn atx_heading(&self, node: Node<'_>, source: &str) -> Block {
        let mut level = 1_usize;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if let Some(digit) = child
                .kind()
                .strip_prefix("atx_h")
                .and_then(|rest| return rest.strip_suffix("_marker"))
                .and_then(|n| return n.parse::<usize>().ok())
            {
                level = digit;
            }
        }
        let raw = node.child_by_field_name("heading_content").map_or_else(
            || return node_text(node, source).trim().trim_matches('#'),
            |content| return node_text(content, source),
        );
        let (text, id) = self.split_heading_id(raw.trim());
        return Block::Header(Header {
            content: self.inline(text),
            id,
            level,
        });
    }

    /// Underlined heading to a decorated header.
    fn setext_heading(&self, node: Node<'_>, source: &str) -> Block {
        let mut symbol = '=';
        let mut raw = "";
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "setext_h2_underline" => symbol = '-',
                "setext_h1_underline" => symbol = '=',
                "paragraph" => raw = node_text(child, source),
                _ => {},
            }
        }
        let (text, id) = self.split_heading_id(raw.trim());
        return Block::DecoratedHeader(DecoratedHeader {
            content: self.inline(text),
            decoration: Decoration {
                overline: false,
                symbol,
            },
            id,
        });
    }

    /// Split `Text {#id}` into the text and the explicit id.
    fn split_heading_id<'t>(&self, raw: &'t str) -> (&'t str, Option<String>) {
        let Some(captures) = self.heading_id.captures(raw) else {
            return (raw, None);
        };
        let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) else {
            return (raw, None);
        };
        return (raw.get(..whole.start()).unwrap_or(raw), Some(id.as_str().to_string()));
    }

    /// `[id]: destination "title"` to a definition, alias, footnote or citation.
    fn link_reference_definition(&self, node: Node<'_>, source: &str) -> Block {
        let whole = node_text(node, source).trim();
        if let Some(block) = self.labelled_paragraph(whole) {
            return block;
        }

        let mut label = "";
        let mut destination = "";
        let mut title = None;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let text = node_text(child, source);
            match child.kind() {
                "link_label" => label = text.trim_start_matches('[').trim_end_matches(']'),
                "link_destination" => destination = text.trim_start_matches('<').trim_end_matches('>'),
                "link_title" => title = Some(text.get(1..text.len().saturating_sub(1)).unwrap_or(text).to_string()),
                _ => {},
            }
        }

        let id = if label == "_" { String::new() } else { label.to_string() };
        if let Some(target) = alias_target(destination)
            && !id.is_empty()
        {
            return Block::LinkAlias(LinkAlias {
                id,
                target: target.to_string(),
            });
        }
        let target = if is_external_url(destination) {
            DefinitionTarget::External {
                url: destination.to_string(),
            }
        } else {
            match Path::parse(destination) {
                Ok(path) => DefinitionTarget::Internal { path },
                Err(_) => DefinitionTarget::External {
                    url: destination.to_string(),
                },
            }
        };
        return Block::LinkDefinition(LinkDefinition { id, target, title });
    }

    /// Paragraph, or one of the paragraph forms for anchors, footnotes and citations.
    fn paragraph(&self, text: &str) -> Block {
        if let Some(block) = self.labelled_paragraph(text) {
            return block;
        }
        if let Some(id) = self.standalone_anchor.captures(text).and_then(|c| return c.get(1)) {
            return Block::InternalLinkTarget {
                id: id.as_str().to_string(),
            };
        }
        let content = self.inline(text);
        if let [Span::Reference(reference)] = content.as_slice()
            && matches!(
                reference.kind,
                ReferenceKind::ImageId { .. } | ReferenceKind::ImagePath { .. }
            )
        {
            return Block::Reference(reference.clone());
        }
        return Block::Paragraph { content };
    }

    /// `[^label]: text` or `[@label]: text`.
    fn labelled_paragraph(&self, text: &str) -> Option<Block> {
        if let Some(captures) = self.footnote.captures(text) {
            let (label, body) = label_and_body(&captures);
            return Some(Block::FootnoteDefinition(FootnoteDefinition {
                content: vec![self.paragraph(body)],
                label: footnote_label(label),
            }));
        }
        if let Some(captures) = self.citation.captures(text) {
            let (label, body) = label_and_body(&captures);
            return Some(Block::Citation(Citation {
                content: vec![self.paragraph(body)],
                id: None,
                label: label.to_string(),
            }));
        }
        return None;
    }

    /// Parse inline text into spans.
    fn inline(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut last = 0_usize;
        for captures in self.inline.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if whole.start() > last
                && let Some(gap) = text.get(last..whole.start())
            {
                spans.push(Span::text(gap));
            }
            spans.push(self.inline_match(&captures, whole.as_str()));
            last = whole.end();
        }
        if let Some(rest) = text.get(last..)
            && !rest.is_empty()
        {
            spans.push(Span::text(rest));
        }
        return spans;
    }

    /// Convert one inline match into a span.
    fn inline_match(&self, captures: &Captures<'_>, source: &str) -> Span {
        let group = |name: &str| return captures.name(name).map(|m| return m.as_str());
        let title = |name: &str| return group(name).map(String::from);

        if let (Some(alt), Some(id)) = (group("image_id_alt"), group("image_id")) {
            let id = reference_id(id, alt);
            return reference(ReferenceKind::ImageId { alt: alt.to_string(), id }, source);
        }
        if let (Some(alt), Some(destination)) = (group("image_alt"), group("image_dest")) {
            let Ok(path) = Path::parse(destination) else {
                return Span::text(source);
            };
            return reference(
                ReferenceKind::ImagePath {
                    alt: alt.to_string(),
                    path,
                    title: title("image_title"),
                },
                source,
            );
        }
        if let Some(label) = group("cite") {
            return reference(ReferenceKind::Citation { label: label.to_string() }, source);
        }
        if let Some(label) = group("footnote") {
            return reference(ReferenceKind::Footnote { label: footnote_label(label) }, source);
        }
        if let (Some(text), Some(id)) = (group("link_id_text"), group("link_id")) {
            let content = self.inline(text);
            let id = reference_id(id, &plain_text(&content));
            return reference(ReferenceKind::LinkId { content, id }, source);
        }
        if let (Some(text), Some(destination)) = (group("link_text"), group("link_dest")) {
            let content = self.inline(text);
            if is_external_url(destination) {
                return Span::Link(Link {
                    content,
                    target: Target::External {
                        url: destination.to_string(),
                    },
                    title: title("link_title"),
                });
            }
            let Ok(path) = Path::parse(destination) else {
                return Span::text(source);
            };
            return reference(
                ReferenceKind::LinkPath {
                    content,
                    path,
                    title: title("link_title"),
                },
                source,
            );
        }
        if let Some(text) = group("strong") {
            return Span::Strong {
                content: self.inline(text),
            };
        }
        if let Some(text) = group("em") {
            return Span::Emphasized {
                content: self.inline(text),
            };
        }
        if let Some(code) = group("code") {
            return Span::Literal { text: code.to_string() };
        }
        return Span::text(source);
    }
}

/// Split TOML front matter between `+++` lines from the markdown body.
pub fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let Some(rest) = source
        .strip_prefix(FRONT_MATTER_FENCE)
        .and_then(|rest| return rest.strip_prefix('\n').or_else(|| return rest.strip_prefix("\r\n")))
    else {
        return (None, source);
    };
    let mut offset = 0_usize;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let front = rest.get(..offset).unwrap_or("");
            let body = rest.get(offset.saturating_add(line.len())..).unwrap_or("");
            return (Some(front), body);
        }
        offset = offset.saturating_add(line.len());
    }
    return (None, source);
}

/// Source text of a node.
fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    return node.utf8_text(source.as_bytes()).unwrap_or("");
}

/// Fenced code block with its info string.
fn fenced_code(node: Node<'_>, source: &str) -> Block {
    let mut code = String::new();
    let mut language = None;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "code_fence_content" => code = node_text(child, source).to_string(),
            "info_string" => {
                language = node_text(child, source)
                    .split_whitespace()
                    .next()
                    .map(String::from);
            },
            _ => {},
        }
    }
    return Block::CodeBlock { code, language };
}

/// Drop up to four leading spaces from every line of an indented code block.
fn unindent(text: &str) -> String {
    return text
        .lines()
        .map(|line| {
            let indent = line.len().saturating_sub(line.trim_start_matches(' ').len()).min(4);
            return line.get(indent..).unwrap_or(line);
        })
        .collect::<Vec<_>>()
        .join("\n");
}

/// Remove `depth` levels of `>` markers from continuation lines.
fn strip_quote_markers(text: &str, depth: usize) -> String {
    if depth == 0 {
        return text.to_string();
    }
    return text
        .lines()
        .map(|line| {
            let mut line = line.trim_start();
            for _ in 0..depth {
                match line.strip_prefix('>') {
                    Some(rest) => line = rest.strip_prefix(' ').unwrap_or(rest),
                    None => break,
                }
            }
            return line;
        })
        .collect::<Vec<_>>()
        .join("\n");
}

/// Target id of a `name_` alias destination.
fn alias_target(destination: &str) -> Option<&str> {
    let name = destination.strip_suffix('_')?;
    if name.is_empty() || name.contains(['/', '.', '#', ':']) {
        return None;
    }
    return Some(name);
}

/// `[]` uses the link text as id, `[_]` marks an anonymous reference.
fn reference_id(written: &str, text: &str) -> String {
    return match written {
        "" => text.to_string(),
        "_" => String::new(),
        id => id.to_string(),
    };
}

/// Footnote label scheme from its written form.
fn footnote_label(raw: &str) -> FootnoteLabel {
    if raw == "#" {
        return FootnoteLabel::Autonumber;
    }
    if raw == "*" {
        return FootnoteLabel::Autosymbol;
    }
    if let Ok(number) = raw.parse::<u32>() {
        return FootnoteLabel::Numeric { number };
    }
    let label = raw.strip_prefix('#').unwrap_or(raw);
    return FootnoteLabel::AutonumberLabel {
        label: label.to_string(),
    };
}

/// First two capture groups of a labelled paragraph.
fn label_and_body<'t>(captures: &Captures<'t>) -> (&'t str, &'t str) {
    let label = captures.get(1).map_or("", |m| return m.as_str());
    let body = captures.get(2).map_or("", |m| return m.as_str());
    return (label, body.trim());
}

/// Span holding an unresolved reference.
fn reference(kind: ReferenceKind, source: &str) -> Span {
    return Span::Reference(Reference::new(kind, source));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Block> {
        let parser = MarkdownParser::new().unwrap();
        return parser.parse(FsPath::new("doc.md"), source).unwrap();
    }

    fn paragraph_spans(block: &Block) -> &[Span] {
        match block {
            Block::Paragraph { content } => return content,
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn atx_heading_with_explicit_id() {
        let blocks = parse("## Getting Started {#start}\n");
        match &blocks[0] {
            Block::Header(header) => {
                assert_eq!(header.level, 2);
                assert_eq!(header.id.as_deref(), Some("start"));
                assert_eq!(plain_text(&header.content), "Getting Started");
            },
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn setext_headings_are_decorated() {
        let blocks = parse("Title\n=====\n\nPart\n----\n");
        assert!(matches!(
            &blocks[0],
            Block::DecoratedHeader(h) if h.decoration.symbol == '='
        ));
        assert!(matches!(
            &blocks[1],
            Block::DecoratedHeader(h) if h.decoration.symbol == '-'
        ));
    }

    #[test]
    fn inline_references() {
        let blocks = parse("See [@knuth], [^#], [the docs][docs] and [guide](../guide.md#intro).\n");
        let spans = paragraph_spans(&blocks[0]);
        let kinds: Vec<&ReferenceKind> = spans
            .iter()
            .filter_map(|s| match s {
                Span::Reference(r) => Some(&r.kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], ReferenceKind::Citation { label } if label == "knuth"));
        assert!(matches!(
            kinds[1],
            ReferenceKind::Footnote {
                label: FootnoteLabel::Autonumber
            }
        ));
        assert!(matches!(kinds[2], ReferenceKind::LinkId { id, .. } if id == "docs"));
        assert!(matches!(kinds[3], ReferenceKind::LinkPath { path, .. } if path.to_string() == "../guide.md#intro"));
    }

    #[test]
    fn external_inline_link_is_resolved_immediately() {
        let blocks = parse("Visit [Rust](https://www.rust-lang.org).\n");
        let spans = paragraph_spans(&blocks[0]);
        assert!(spans.iter().any(|s| matches!(s, Span::Link(_))));
    }

    #[test]
    fn definitions_and_aliases() {
        let blocks = parse("[docs]: https://docs.rs \"Docs\"\n[home]: ../index.md\n[ref]: docs_\n[_]: https://anon.example\n");
        assert!(blocks.iter().any(|b| matches!(
            b,
            Block::LinkDefinition(d) if d.id == "docs" && d.title.as_deref() == Some("Docs")
        )));
        assert!(blocks.iter().any(|b| matches!(
            b,
            Block::LinkDefinition(LinkDefinition { target: DefinitionTarget::Internal { .. }, .. })
        )));
        assert!(blocks.iter().any(|b| matches!(b, Block::LinkAlias(a) if a.target == "docs")));
        assert!(blocks.iter().any(|b| matches!(b, Block::LinkDefinition(d) if d.id.is_empty())));
    }

    #[test]
    fn footnote_and_citation_paragraphs() {
        let blocks = parse("[^1]: First note body.\n\n[@knuth]: The Art of Computer Programming.\n\n{#here}\n");
        assert!(matches!(
            &blocks[0],
            Block::FootnoteDefinition(d) if d.label == FootnoteLabel::Numeric { number: 1 }
        ));
        assert!(matches!(&blocks[1], Block::Citation(c) if c.label == "knuth"));
        assert!(matches!(&blocks[2], Block::InternalLinkTarget { id } if id == "here"));
    }

    #[test]
    fn standalone_image_is_a_block_reference() {
        let blocks = parse("![diagram](img/arch.png)\n");
        assert!(matches!(&blocks[0], Block::Reference(_)));
    }

    #[test]
    fn front_matter_is_split() {
        let (front, body) = split_front_matter("+++\nfirst_header_as_title = true\n+++\n# Doc\n");
        assert_eq!(front, Some("first_header_as_title = true\n"));
        assert_eq!(body, "# Doc\n");
        assert_eq!(split_front_matter("# Doc\n"), (None, "# Doc\n"));
    }

    #[test]
    fn footnote_label_forms() {
        assert_eq!(footnote_label("*"), FootnoteLabel::Autosymbol);
        assert_eq!(footnote_label("12"), FootnoteLabel::Numeric { number: 12 });
        assert_eq!(footnote_label("#note"), FootnoteLabel::AutonumberLabel {
            label: "note".to_string()
        });
    }
}
