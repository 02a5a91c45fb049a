//! Reference rewriting for one document.
//!
//! The same [`Rewriter`] runs in both phases. Without a tree index it only
//! uses what the document itself declares and leaves every reference that
//! needs the rest of the tree in place; with one it settles whatever is left.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{
    Block, Citation, DefinitionTarget, Footnote, FootnoteDefinition, FootnoteLabel, Image, InternalTarget,
    InvalidBlock, InvalidSpan, Link, LinkAlias, LinkDefinition, Reference, ReferenceKind, Section, Span, Target,
    Title,
};
use crate::config::{Config, GlobalTarget, TargetFormats};
use crate::diagnostics::{Diagnostic, ErrorKind, Problem};
use crate::index::{AnchorLookup, DefinedTarget, DocumentIndex, Entry, LinkDefinitionEntry, TreeIndex};
use crate::numbering::{self, FootnoteCursor};
use crate::path::{AbsolutePath, Path, PathResolution};

/// Longest alias chain followed before giving up.
const MAX_ALIAS_DEPTH: usize = 64;

/// Where a link id leads once aliases are followed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Destination {
    /// A URL outside the tree.
    External {
        /// Optional title.
        title: Option<String>,
        /// The URL.
        url: String,
    },
    /// A path that still has to be validated against the tree.
    Path {
        /// Path as declared.
        path: Path,
        /// Optional title.
        title: Option<String>,
    },
    /// A finished target.
    Target(Target),
}

/// Outcome of looking up a link id.
#[derive(Debug, Clone, PartialEq, Eq)]
enum IdOutcome {
    /// Needs the tree index; carries the id to look up once aliases are followed.
    Deferred(String),
    /// The id cannot be used.
    Failed(Problem),
    /// The id leads somewhere.
    Found(Destination),
    /// Nothing declares the id; carries the id at the end of the alias chain.
    Missing(String),
}

/// Outcome of resolving a path reference.
enum PathOutcome {
    /// Needs the tree index.
    Deferred,
    /// The path cannot be used.
    Failed(Problem),
    /// The path resolved.
    Resolved(Target),
}

/// Mutable state of one pass over one document.
///
/// Created per document and per phase, dropped when the pass ends.
pub struct Rewriter<'a> {
    /// Link ids currently being followed, for cycle detection.
    active: Vec<String>,
    /// Next anonymous definition to pair with.
    anonymous_next: usize,
    /// Outcomes of link ids already looked up in this pass.
    cache: HashMap<String, IdOutcome>,
    /// Effective configuration of the document.
    config: &'a Config,
    /// Diagnostics emitted so far.
    diagnostics: Vec<Diagnostic>,
    /// Path of the document being rewritten.
    document: &'a AbsolutePath,
    /// Auto-number and auto-symbol pairing state.
    footnote_cursor: FootnoteCursor,
    /// Next footnote definition, in document order.
    footnote_next: usize,
    /// Targets declared by the document.
    index: &'a DocumentIndex,
    /// Tree-wide view; absent during the local phase.
    tree: Option<&'a TreeIndex>,
}

impl<'a> Rewriter<'a> {
    /// Prepare a pass over the document at `document`.
    pub fn new(
        document: &'a AbsolutePath,
        config: &'a Config,
        index: &'a DocumentIndex,
        tree: Option<&'a TreeIndex>,
    ) -> Self {
        return Self {
            active: Vec::new(),
            anonymous_next: 0,
            cache: HashMap::new(),
            config,
            diagnostics: Vec::new(),
            document,
            footnote_cursor: FootnoteCursor::default(),
            footnote_next: 0,
            index,
            tree,
        };
    }

    /// Rewrite the top-level blocks of the document and return them with the
    /// diagnostics of every invalid element produced.
    pub fn run(mut self, blocks: Vec<Block>) -> (Vec<Block>, Vec<Diagnostic>) {
        let blocks = self.rewrite_blocks(blocks);
        return (blocks, self.diagnostics);
    }

    /// Rewrite a block sequence, dropping blocks without visual representation.
    fn rewrite_blocks(&mut self, blocks: Vec<Block>) -> Vec<Block> {
        return blocks
            .into_iter()
            .filter_map(|block| return self.rewrite_block(block))
            .collect();
    }

    /// Rewrite one block; `None` removes it from the output.
    fn rewrite_block(&mut self, block: Block) -> Option<Block> {
        return match block {
            Block::Citation(citation) => Some(self.rewrite_citation(citation)),
            Block::FootnoteDefinition(definition) => Some(self.rewrite_footnote_definition(definition)),
            Block::Footnote(footnote) => Some(Block::Footnote(Footnote {
                content: self.rewrite_blocks(footnote.content),
                ..footnote
            })),
            Block::Header(mut header) => {
                header.content = self.rewrite_spans(header.content);
                let duplicate = header.id.as_ref().is_some_and(|id| return self.index.anchors.is_duplicate(id));
                let id = header.id.clone().unwrap_or_default();
                let block = Block::Header(header);
                if duplicate {
                    return Some(self.duplicate_target(block, &id));
                }
                Some(block)
            },
            Block::InternalLinkTarget { id } => {
                let block = Block::InternalLinkTarget { id: id.clone() };
                if self.index.anchors.is_duplicate(&id) {
                    return Some(self.duplicate_target(block, &id));
                }
                Some(block)
            },
            Block::Invalid(invalid) => Some(Block::Invalid(self.rewrite_invalid(invalid))),
            Block::LinkAlias(alias) => self.rewrite_link_alias(alias),
            Block::LinkDefinition(definition) => self.rewrite_link_definition(definition),
            Block::Paragraph { content } => Some(Block::Paragraph {
                content: self.rewrite_spans(content),
            }),
            Block::QuotedBlock { content } => Some(Block::QuotedBlock {
                content: self.rewrite_blocks(content),
            }),
            Block::Reference(reference) => Some(self.rewrite_block_reference(reference)),
            Block::Section(section) => Some(self.rewrite_section(section)),
            Block::Title(title) => Some(self.rewrite_title(title)),
            other @ (Block::CodeBlock { .. }
            | Block::DecoratedHeader(_)
            | Block::Opaque { .. }
            | Block::Rule) => Some(other),
        };
    }

    /// Assign the citation id, or invalidate a repeated label.
    fn rewrite_citation(&mut self, citation: Citation) -> Block {
        let content = self.rewrite_blocks(citation.content);
        if citation.label.is_empty() {
            let block = Block::Citation(Citation { content, ..citation });
            return self.invalid_block(block, Problem::new(ErrorKind::UnresolvedReference, "citation with empty label"));
        }
        let block = Block::Citation(Citation {
            content,
            id: Some(format!("__cit-{}", citation.label)),
            label: citation.label.clone(),
        });
        if self.index.citations.is_duplicate(&citation.label) {
            return self.duplicate_target(block, &citation.label);
        }
        return block;
    }

    /// Turn a footnote definition into a numbered footnote.
    fn rewrite_footnote_definition(&mut self, definition: FootnoteDefinition) -> Block {
        let ordinal = self.footnote_next;
        self.footnote_next = ordinal.saturating_add(1);
        let content = self.rewrite_blocks(definition.content);

        let duplicate_key = match &definition.label {
            FootnoteLabel::Numeric { number } => {
                let key = number.to_string();
                self.index.numeric_footnotes.is_duplicate(&key).then_some(key)
            },
            FootnoteLabel::AutonumberLabel { label } => {
                self.index.labelled_footnotes.is_duplicate(label).then(|| return label.clone())
            },
            FootnoteLabel::Autonumber | FootnoteLabel::Autosymbol => None,
        };
        if let Some(key) = duplicate_key {
            let block = Block::FootnoteDefinition(FootnoteDefinition { content, ..definition });
            return self.duplicate_target(block, &key);
        }

        let Some(assigned) = self.index.footnotes.definition(ordinal).cloned() else {
            let block = Block::FootnoteDefinition(FootnoteDefinition { content, ..definition });
            return self.invalid_block(
                block,
                Problem::new(ErrorKind::UnresolvedReference, "footnote definition with empty label"),
            );
        };
        return Block::Footnote(Footnote {
            content,
            id: assigned.id,
            label: assigned.label,
        });
    }

    /// Rewrite the references inside an invalidated block. The block stays
    /// invalid; its fallback keeps the resolved content.
    fn rewrite_invalid(&mut self, invalid: InvalidBlock) -> InvalidBlock {
        let fallback = match *invalid.fallback {
            Block::Citation(citation) => Block::Citation(Citation {
                content: self.rewrite_blocks(citation.content),
                ..citation
            }),
            Block::FootnoteDefinition(definition) => Block::FootnoteDefinition(FootnoteDefinition {
                content: self.rewrite_blocks(definition.content),
                ..definition
            }),
            Block::Header(mut header) => {
                header.content = self.rewrite_spans(header.content);
                Block::Header(header)
            },
            Block::Section(mut section) => {
                section.header.content = self.rewrite_spans(section.header.content);
                section.content = self.rewrite_blocks(section.content);
                Block::Section(section)
            },
            Block::Title(mut title) => {
                title.content = self.rewrite_spans(title.content);
                Block::Title(title)
            },
            other => other,
        };
        return InvalidBlock {
            fallback: Box::new(fallback),
            ..invalid
        };
    }

    /// Drop a usable alias; invalidate a repeated or circular one.
    fn rewrite_link_alias(&mut self, alias: LinkAlias) -> Option<Block> {
        if self.index.link_definitions.is_duplicate(&alias.id) {
            let id = alias.id.clone();
            return Some(self.duplicate_definition(Block::LinkAlias(alias), &id));
        }
        return match self.lookup_id(&alias.id) {
            IdOutcome::Failed(problem) if is_alias_loop_problem(&problem) => {
                Some(self.invalid_block(Block::LinkAlias(alias), problem))
            },
            _ => None,
        };
    }

    /// Drop a definition once indexed; a repeated one is dropped when external
    /// and invalidated when internal.
    fn rewrite_link_definition(&mut self, definition: LinkDefinition) -> Option<Block> {
        if definition.id.is_empty() || !self.index.link_definitions.is_duplicate(&definition.id) {
            return None;
        }
        return match definition.target {
            DefinitionTarget::External { .. } => None,
            DefinitionTarget::Internal { .. } => {
                let id = definition.id.clone();
                Some(self.duplicate_definition(Block::LinkDefinition(definition), &id))
            },
        };
    }

    /// Rewrite a section's header and content, invalidating a repeated id.
    fn rewrite_section(&mut self, section: Section) -> Block {
        let mut header = section.header;
        header.content = self.rewrite_spans(header.content);
        let content = self.rewrite_blocks(section.content);
        let id = header.id.clone();
        let block = Block::Section(Section { content, header });
        return match id {
            Some(id) if self.index.anchors.is_duplicate(&id) => self.duplicate_target(block, &id),
            _ => block,
        };
    }

    /// Rewrite the title text, invalidating a repeated id.
    fn rewrite_title(&mut self, title: Title) -> Block {
        let content = self.rewrite_spans(title.content);
        let id = title.id;
        let block = Block::Title(Title {
            content,
            id: id.clone(),
        });
        return match id {
            Some(id) if self.index.anchors.is_duplicate(&id) => self.duplicate_target(block, &id),
            _ => block,
        };
    }

    /// Resolve a reference standing as a block; a resolved one becomes a
    /// paragraph holding the resolved span.
    fn rewrite_block_reference(&mut self, reference: Reference) -> Block {
        return match self.resolve_reference(reference) {
            Span::Reference(pending) => Block::Reference(pending),
            Span::Invalid(invalid) => {
                let fallback = match *invalid.fallback {
                    Span::Reference(original) => Block::Reference(original),
                    other => Block::Paragraph { content: vec![other] },
                };
                Block::Invalid(InvalidBlock {
                    fallback: Box::new(fallback),
                    kind: invalid.kind,
                    message: invalid.message,
                })
            },
            resolved => Block::Paragraph {
                content: vec![resolved],
            },
        };
    }

    /// Rewrite a span sequence.
    fn rewrite_spans(&mut self, spans: Vec<Span>) -> Vec<Span> {
        return spans.into_iter().map(|span| return self.rewrite_span(span)).collect();
    }

    /// Rewrite one span.
    fn rewrite_span(&mut self, span: Span) -> Span {
        return match span {
            Span::Emphasized { content } => Span::Emphasized {
                content: self.rewrite_spans(content),
            },
            Span::Link(link) => Span::Link(Link {
                content: self.rewrite_spans(link.content),
                ..link
            }),
            Span::Reference(reference) => self.resolve_reference(reference),
            Span::Strong { content } => Span::Strong {
                content: self.rewrite_spans(content),
            },
            other @ (Span::CitationLink { .. }
            | Span::FootnoteLink { .. }
            | Span::Image(_)
            | Span::Invalid(_)
            | Span::Literal { .. }
            | Span::Opaque { .. }
            | Span::Text { .. }) => other,
        };
    }

    /// Replace a reference with a resolved span, an invalid span, or itself
    /// when it has to wait for the tree index.
    fn resolve_reference(&mut self, reference: Reference) -> Span {
        let Reference { kind, source } = reference;
        return match kind {
            ReferenceKind::Citation { label } => self.resolve_citation(label, source),
            ReferenceKind::Footnote { label } => self.resolve_footnote(label, source),
            ReferenceKind::ImageId { alt, id } => {
                let outcome = self.lookup_reference_id(&id);
                let pending = Reference::new(ReferenceKind::ImageId { alt, id }, source);
                self.finish_id_reference(pending, outcome, "image")
            },
            ReferenceKind::LinkId { content, id } => {
                let content = self.rewrite_spans(content);
                let outcome = self.lookup_reference_id(&id);
                let pending = Reference::new(ReferenceKind::LinkId { content, id }, source);
                self.finish_id_reference(pending, outcome, "link")
            },
            ReferenceKind::ImagePath { .. } | ReferenceKind::LinkPath { .. } => {
                self.resolve_path_reference(Reference::new(kind, source))
            },
        };
    }

    /// Resolve a citation reference by label.
    fn resolve_citation(&mut self, label: String, source: String) -> Span {
        let problem = match self.index.citations.get(&label) {
            _ if label.is_empty() => Problem::new(ErrorKind::UnresolvedReference, "citation reference with empty label"),
            Some(Entry::Unique(())) => {
                return Span::CitationLink {
                    label: label.clone(),
                    reference: label,
                };
            },
            Some(Entry::Duplicate) => self.duplicate_target_problem(&label),
            None => Problem::new(
                ErrorKind::UnresolvedReference,
                format!("unresolved citation reference: {label}"),
            ),
        };
        let original = Reference::new(ReferenceKind::Citation { label }, source);
        return self.invalid_span(Span::Reference(original), problem);
    }

    /// Resolve a footnote reference by number, label, or position.
    fn resolve_footnote(&mut self, label: FootnoteLabel, source: String) -> Span {
        let index = self.index;
        let found = match &label {
            FootnoteLabel::Numeric { number } => {
                let key = number.to_string();
                match index.numeric_footnotes.get(&key) {
                    Some(Entry::Unique(())) => Ok(numbering::numeric(*number)),
                    Some(Entry::Duplicate) => Err(self.duplicate_target_problem(&key)),
                    None => Err(unresolved_footnote(&key)),
                }
            },
            FootnoteLabel::AutonumberLabel { label } if label.is_empty() => Err(Problem::new(
                ErrorKind::UnresolvedReference,
                "footnote reference with empty label",
            )),
            FootnoteLabel::AutonumberLabel { label } => match index.labelled_footnotes.get(label) {
                Some(Entry::Unique(())) => index.footnotes.labelled(label).cloned().ok_or_else(|| return unresolved_footnote(label)),
                Some(Entry::Duplicate) => Err(self.duplicate_target_problem(label)),
                None => Err(unresolved_footnote(label)),
            },
            FootnoteLabel::Autonumber => self.footnote_cursor.next_autonumber(&index.footnotes).cloned(),
            FootnoteLabel::Autosymbol => self.footnote_cursor.next_autosymbol(&index.footnotes).cloned(),
        };
        return match found {
            Ok(footnote) => Span::FootnoteLink {
                id: footnote.id,
                label: footnote.label,
            },
            Err(problem) => {
                let original = Reference::new(ReferenceKind::Footnote { label }, source);
                self.invalid_span(Span::Reference(original), problem)
            },
        };
    }

    /// Look up the id of a link or image reference; an empty id pairs with
    /// the next anonymous definition.
    fn lookup_reference_id(&mut self, id: &str) -> IdOutcome {
        if !id.is_empty() {
            return self.lookup_id(id);
        }
        let position = self.anonymous_next;
        self.anonymous_next = position.saturating_add(1);
        return match self.index.anonymous.get(position) {
            Some(defined) => IdOutcome::Found(declared_destination(defined)),
            None => IdOutcome::Failed(Problem::new(
                ErrorKind::TooManyAnonymousReferences,
                "too many anonymous references",
            )),
        };
    }

    /// Look up a link id, following aliases with cycle detection.
    fn lookup_id(&mut self, id: &str) -> IdOutcome {
        if let Some(hit) = self.cache.get(id) {
            return hit.clone();
        }
        if self.active.iter().any(|active| return active == id) {
            return IdOutcome::Failed(Problem::new(
                ErrorKind::CircularAliasReference,
                format!("circular link reference: {id}"),
            ));
        }
        if self.active.len() >= MAX_ALIAS_DEPTH {
            return IdOutcome::Failed(Problem::new(
                ErrorKind::CircularConfigOrIndexReference,
                format!("link alias chain exceeds {MAX_ALIAS_DEPTH} steps at id: {id}"),
            ));
        }

        self.active.push(id.to_string());
        let outcome = self.lookup_id_uncached(id);
        self.active.pop();
        // A cycle is reported from the id that closes it, which depends on
        // where the lookup started.
        if !is_alias_loop(&outcome) {
            self.cache.insert(id.to_string(), outcome.clone());
        }
        return outcome;
    }

    /// Apply the link id precedence: local definitions and aliases, local
    /// anchors, configured global targets, then anchors elsewhere in the tree.
    fn lookup_id_uncached(&mut self, id: &str) -> IdOutcome {
        match self.index.link_definitions.get(id) {
            Some(Entry::Duplicate) => {
                return IdOutcome::Failed(Problem::new(
                    ErrorKind::DuplicateIdentifier,
                    format!("More than one link definition with id '{id}' in path {}", self.document),
                ));
            },
            Some(Entry::Unique(LinkDefinitionEntry::Alias(target))) => {
                let target = target.clone();
                return self.lookup_id(&target);
            },
            Some(Entry::Unique(LinkDefinitionEntry::Target(defined))) => {
                return IdOutcome::Found(declared_destination(defined));
            },
            None => {},
        }

        match self.index.anchors.get(id) {
            Some(Entry::Duplicate) => return IdOutcome::Failed(self.duplicate_target_problem(id)),
            Some(Entry::Unique(())) => {
                let absolute = self.document.with_fragment(Some(id));
                let relative = absolute.relative_to(self.document);
                return IdOutcome::Found(Destination::Target(Target::Internal(InternalTarget {
                    absolute,
                    external_url: None,
                    relative,
                })));
            },
            None => {},
        }

        let Some(tree) = self.tree else {
            return IdOutcome::Deferred(id.to_string());
        };

        if let Some(global) = self.config.global_targets.get(id) {
            return IdOutcome::Found(match global {
                GlobalTarget::External(url) => Destination::External {
                    title: None,
                    url: url.clone(),
                },
                GlobalTarget::Internal(path) => Destination::Path {
                    path: Path::Absolute(path.clone()),
                    title: None,
                },
            });
        }

        return match tree.find_anchor(id, self.document) {
            AnchorLookup::Found(path) => IdOutcome::Found(Destination::Path {
                path: Path::Absolute(path),
                title: None,
            }),
            AnchorLookup::Duplicate(scope) => IdOutcome::Failed(Problem::new(
                ErrorKind::DuplicateIdentifier,
                format!("More than one link target with id '{id}' in path {scope}"),
            )),
            AnchorLookup::Missing => IdOutcome::Missing(id.to_string()),
        };
    }

    /// Build the span for a link or image id reference from its lookup outcome.
    /// `noun` names the reference kind in the unresolved message.
    fn finish_id_reference(&mut self, pending: Reference, outcome: IdOutcome, noun: &str) -> Span {
        return match outcome {
            IdOutcome::Deferred(final_id) => Span::Reference(with_id(pending, final_id)),
            IdOutcome::Failed(problem) => self.invalid_span(Span::Reference(pending), problem),
            IdOutcome::Missing(final_id) => {
                let problem = Problem::new(
                    ErrorKind::UnresolvedReference,
                    format!("unresolved {noun} id reference: {final_id}"),
                );
                self.invalid_span(Span::Reference(pending), problem)
            },
            IdOutcome::Found(destination) => match destination {
                Destination::External { title, url } => finished(pending, Target::External { url }, title),
                Destination::Target(target) => finished(pending, target, None),
                Destination::Path { path, title } => {
                    let source = pending.source.clone();
                    let kind = match pending.kind {
                        ReferenceKind::ImageId { alt, .. } => ReferenceKind::ImagePath { alt, path, title },
                        ReferenceKind::LinkId { content, .. } => ReferenceKind::LinkPath { content, path, title },
                        other => other,
                    };
                    self.resolve_path_reference(Reference::new(kind, source))
                },
            },
        };
    }

    /// Resolve a link or image path reference.
    fn resolve_path_reference(&mut self, reference: Reference) -> Span {
        let path = match &reference.kind {
            ReferenceKind::ImagePath { path, .. } | ReferenceKind::LinkPath { path, .. } => path.clone(),
            _ => return Span::Reference(reference),
        };
        return match self.resolve_path(&path) {
            PathOutcome::Deferred => Span::Reference(reference),
            PathOutcome::Failed(problem) => self.invalid_span(Span::Reference(reference), problem),
            PathOutcome::Resolved(target) => match reference.kind {
                ReferenceKind::ImagePath { alt, title, .. } => Span::Image(Image { alt, target, title }),
                ReferenceKind::LinkPath { content, title, .. } => Span::Link(Link { content, target, title }),
                other => Span::Reference(Reference::new(other, reference.source)),
            },
        };
    }

    /// Resolve a path written in the document against the tree.
    fn resolve_path(&self, path: &Path) -> PathOutcome {
        let absolute = match path {
            Path::Absolute(absolute) => absolute.clone(),
            Path::Relative(relative) => match self.document.resolve_from_document(relative) {
                PathResolution::Internal(absolute) => absolute,
                PathResolution::EscapesRoot(_) => {
                    return PathOutcome::Resolved(Target::External { url: path.to_string() });
                },
            },
        };
        let Some(tree) = self.tree else {
            return PathOutcome::Deferred;
        };

        if !tree.is_static(&absolute) {
            let Some(summary) = tree.document(&absolute) else {
                return PathOutcome::Failed(unresolved_internal(path));
            };
            if let Some(fragment) = absolute.fragment()
                && !summary.anchors.contains(fragment)
            {
                return PathOutcome::Failed(unresolved_internal(path));
            }
            if let Some(problem) = format_problem(&self.config.target_formats, &summary.formats) {
                return PathOutcome::Failed(problem);
            }
        }

        let external_url = self.external_url(&absolute);
        let relative = absolute.relative_to(self.document);
        return PathOutcome::Resolved(Target::Internal(InternalTarget {
            absolute,
            external_url,
            relative,
        }));
    }

    /// External URL of a target in another document under a configured mapping.
    fn external_url(&self, absolute: &AbsolutePath) -> Option<String> {
        if absolute.without_fragment() == *self.document {
            return None;
        }
        let mapping = self.config.mapping_for(absolute)?;
        let below = absolute.segments_below(&mapping.internal_path)?.join("/");
        let mut url = mapping.external_url.clone();
        if !below.is_empty() {
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str(&below);
        }
        if let Some(fragment) = absolute.fragment() {
            url.push('#');
            url.push_str(fragment);
        }
        return Some(url);
    }

    /// Problem for a reference to an anchor-like id declared more than once.
    fn duplicate_target_problem(&self, id: &str) -> Problem {
        return Problem::new(
            ErrorKind::DuplicateIdentifier,
            format!("More than one link target with id '{id}' in path {}", self.document),
        );
    }

    /// Invalidate a target block whose id is declared more than once.
    fn duplicate_target(&mut self, block: Block, id: &str) -> Block {
        let problem = self.duplicate_target_problem(id);
        return self.invalid_block(block, problem);
    }

    /// Invalidate a link definition or alias whose id is declared more than once.
    fn duplicate_definition(&mut self, block: Block, id: &str) -> Block {
        let problem = Problem::new(
            ErrorKind::DuplicateIdentifier,
            format!("More than one link definition with id '{id}' in path {}", self.document),
        );
        return self.invalid_block(block, problem);
    }

    /// Wrap `fallback` in an invalid block and record the diagnostic.
    fn invalid_block(&mut self, fallback: Block, problem: Problem) -> Block {
        self.record(&problem);
        return Block::Invalid(InvalidBlock {
            fallback: Box::new(fallback),
            kind: problem.kind,
            message: problem.message,
        });
    }

    /// Wrap `fallback` in an invalid span and record the diagnostic.
    fn invalid_span(&mut self, fallback: Span, problem: Problem) -> Span {
        self.record(&problem);
        return Span::Invalid(InvalidSpan {
            fallback: Box::new(fallback),
            kind: problem.kind,
            message: problem.message,
        });
    }

    /// Log and keep a diagnostic for `problem`.
    fn record(&mut self, problem: &Problem) {
        debug!(document = %self.document, kind = problem.kind.tag(), "{}", problem.message);
        self.diagnostics.push(problem.clone().at(self.document));
    }
}

/// Whether following aliases ran into a cycle or the depth limit.
fn is_alias_loop(outcome: &IdOutcome) -> bool {
    return matches!(outcome, IdOutcome::Failed(problem) if is_alias_loop_problem(problem));
}

/// Whether `problem` comes from a cycle or an overlong alias chain.
const fn is_alias_loop_problem(problem: &Problem) -> bool {
    return matches!(
        problem.kind,
        ErrorKind::CircularAliasReference | ErrorKind::CircularConfigOrIndexReference
    );
}

/// Destination declared by a link definition.
fn declared_destination(defined: &DefinedTarget) -> Destination {
    return match &defined.target {
        DefinitionTarget::External { url } => Destination::External {
            title: defined.title.clone(),
            url: url.clone(),
        },
        DefinitionTarget::Internal { path } => Destination::Path {
            path: path.clone(),
            title: defined.title.clone(),
        },
    };
}

/// Resolved span for an id reference pointing at `target`.
fn finished(pending: Reference, target: Target, title: Option<String>) -> Span {
    return match pending.kind {
        ReferenceKind::ImageId { alt, .. } => Span::Image(Image { alt, target, title }),
        ReferenceKind::LinkId { content, .. } => Span::Link(Link { content, target, title }),
        other => Span::Reference(Reference::new(other, pending.source)),
    };
}

/// The same id reference looking up `id` instead, for alias chains that end
/// outside the document.
fn with_id(pending: Reference, id: String) -> Reference {
    let kind = match pending.kind {
        ReferenceKind::ImageId { alt, .. } => ReferenceKind::ImageId { alt, id },
        ReferenceKind::LinkId { content, .. } => ReferenceKind::LinkId { content, id },
        other => other,
    };
    return Reference::new(kind, pending.source);
}

/// Problem for a footnote reference without a definition.
fn unresolved_footnote(label: &str) -> Problem {
    return Problem::new(
        ErrorKind::UnresolvedReference,
        format!("unresolved footnote reference: {label}"),
    );
}

/// Problem for a path that names nothing in the tree.
fn unresolved_internal(path: &Path) -> Problem {
    return Problem::new(
        ErrorKind::UnresolvedReference,
        format!("unresolved internal reference: {path}"),
    );
}

/// Problem when `destination` is enabled for fewer formats than `source`.
fn format_problem(source: &TargetFormats, destination: &TargetFormats) -> Option<Problem> {
    if source.is_subset_of(destination) {
        return None;
    }
    let message = match source {
        TargetFormats::All => {
            "document for all output formats cannot reference a document with restricted output formats".to_string()
        },
        TargetFormats::Only(_) => format!(
            "document with output formats {} cannot reference a document restricted to {}",
            source.describe(),
            destination.describe()
        ),
    };
    return Some(Problem::new(ErrorKind::RestrictedTargetFormat, message));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs(raw: &str) -> AbsolutePath {
        return AbsolutePath::parse(raw).unwrap();
    }

    fn link_id(id: &str) -> Span {
        return Span::Reference(Reference::new(
            ReferenceKind::LinkId {
                content: vec![Span::text(id)],
                id: id.to_string(),
            },
            format!("[{id}][]"),
        ));
    }

    fn local(blocks: Vec<Block>) -> (Vec<Block>, Vec<Diagnostic>) {
        let document = abs("/doc.md");
        let config = Config::default();
        let index = DocumentIndex::build(&blocks);
        return Rewriter::new(&document, &config, &index, None).run(blocks);
    }

    fn first_span(blocks: &[Block]) -> &Span {
        match blocks.first() {
            Some(Block::Paragraph { content }) => return &content[0],
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn external_definition_resolves_and_disappears() {
        let (blocks, diagnostics) = local(vec![
            Block::Paragraph {
                content: vec![link_id("rust")],
            },
            Block::LinkDefinition(LinkDefinition {
                id: "rust".to_string(),
                target: DefinitionTarget::External {
                    url: "https://www.rust-lang.org".to_string(),
                },
                title: Some("Rust".to_string()),
            }),
        ]);
        assert!(diagnostics.is_empty());
        assert_eq!(blocks.len(), 1);
        match first_span(&blocks) {
            Span::Link(link) => {
                assert_eq!(link.target, Target::External {
                    url: "https://www.rust-lang.org".to_string()
                });
                assert_eq!(link.title.as_deref(), Some("Rust"));
            },
            other => panic!("expected link, got {other:?}"),
        }
    }

    #[test]
    fn unknown_id_is_deferred_locally() {
        let (blocks, diagnostics) = local(vec![Block::Paragraph {
            content: vec![link_id("elsewhere")],
        }]);
        assert!(diagnostics.is_empty());
        assert!(matches!(first_span(&blocks), Span::Reference(_)));
    }

    #[test]
    fn local_anchor_resolves_to_fragment() {
        let (blocks, _) = local(vec![
            Block::Paragraph {
                content: vec![link_id("here")],
            },
            Block::InternalLinkTarget { id: "here".to_string() },
        ]);
        match first_span(&blocks) {
            Span::Link(Link {
                target: Target::Internal(target),
                ..
            }) => {
                assert_eq!(target.absolute, abs("/doc.md#here"));
                assert_eq!(target.relative.to_string(), "#here");
            },
            other => panic!("expected internal link, got {other:?}"),
        }
    }

    #[test]
    fn surplus_anonymous_reference_fails() {
        let (blocks, diagnostics) = local(vec![Block::Paragraph {
            content: vec![link_id("")],
        }]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::TooManyAnonymousReferences);
        assert!(matches!(first_span(&blocks), Span::Invalid(_)));
    }

    #[test]
    fn mapped_url_joins_segments_and_fragment() {
        let document = abs("/tree1/doc3.md");
        let config = Config {
            link_mappings: vec![crate::config::LinkMapping {
                external_url: "http://external".to_string(),
                internal_path: abs("/tree2"),
            }],
            ..Config::default()
        };
        let index = DocumentIndex::default();
        let rewriter = Rewriter::new(&document, &config, &index, None);
        assert_eq!(
            rewriter.external_url(&abs("/tree2/sub/doc5.md#ref")).as_deref(),
            Some("http://external/sub/doc5.md#ref")
        );
        assert!(rewriter.external_url(&abs("/tree1/other.md")).is_none());
    }

    #[test]
    fn format_messages() {
        let pdf = TargetFormats::Only(["pdf".to_string()].into());
        let html = TargetFormats::Only(["html".to_string()].into());
        assert!(format_problem(&pdf, &TargetFormats::All).is_none());
        assert_eq!(
            format_problem(&TargetFormats::All, &pdf).unwrap().message,
            "document for all output formats cannot reference a document with restricted output formats"
        );
        assert_eq!(
            format_problem(&html, &pdf).unwrap().message,
            "document with output formats [html] cannot reference a document restricted to [pdf]"
        );
    }
}
