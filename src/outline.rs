//! Outline building: flat header sequences become nested sections.
//!
//! Decorated headers get levels in order of first appearance of their
//! decoration, the first header may be promoted to the document title, and
//! every header receives a slug id unique within its document.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{Block, DecoratedHeader, Decoration, Header, Section, Span, Title, plain_text};

/// Base id used when a header's text yields an empty slug.
const EMPTY_SLUG: &str = "section";

/// Turn a document's flat block sequence into titled, nested sections.
///
/// Blocks already in section form pass through untouched, so running the
/// builder on its own output changes nothing.
pub fn build_outline(blocks: Vec<Block>, first_header_as_title: bool) -> Vec<Block> {
    let mut slugs = SlugRegistry::new(&blocks);
    let promote_title = first_header_as_title && !blocks.iter().any(|b| return matches!(b, Block::Title(_)));
    let leveled = level_headers(blocks, promote_title, &mut slugs);
    return nest_sections(leveled);
}

/// Convert heading text to an anchor-compatible slug.
/// Lowercase, non-alphanumeric runs to single hyphens, trim edges.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut result = String::with_capacity(lowered.len());
    let mut prev_hyphen = true; // Start true to trim leading hyphens.

    for c in lowered.chars() {
        if c.is_alphanumeric() {
            result.push(c);
            prev_hyphen = false;
            continue;
        }
        if prev_hyphen {
            continue;
        }
        result.push('-');
        prev_hyphen = true;
    }

    if result.ends_with('-') {
        result.pop();
    }
    return result;
}

/// Hands out slug ids that are unique within one document.
///
/// Seeded with every explicit anchor id so derived slugs never collide with them.
struct SlugRegistry {
    /// Ids already taken.
    used: HashSet<String>,
}

impl SlugRegistry {
    /// Seed the registry with the explicit ids found anywhere in `blocks`.
    fn new(blocks: &[Block]) -> Self {
        let mut used = HashSet::new();
        collect_explicit_ids(blocks, &mut used);
        return Self { used };
    }

    /// Keep an explicit id, or derive a fresh slug from `content`.
    fn assign(&mut self, explicit: Option<String>, content: &[Span]) -> String {
        if let Some(id) = explicit {
            return id;
        }
        let slug = slugify(&plain_text(content));
        let base = if slug.is_empty() { EMPTY_SLUG.to_string() } else { slug };

        let mut candidate = base.clone();
        let mut suffix = 0_usize;
        while self.used.contains(&candidate) {
            suffix = suffix.saturating_add(1);
            candidate = format!("{base}-{suffix}");
        }
        self.used.insert(candidate.clone());
        return candidate;
    }
}

/// Record every explicit anchor id in `blocks`, recursing into containers.
fn collect_explicit_ids(blocks: &[Block], used: &mut HashSet<String>) {
    for block in blocks {
        match block {
            Block::InternalLinkTarget { id } => {
                used.insert(id.clone());
            },
            Block::Header(Header { id: Some(id), .. })
            | Block::DecoratedHeader(DecoratedHeader { id: Some(id), .. })
            | Block::Title(Title { id: Some(id), .. }) => {
                used.insert(id.clone());
            },
            Block::Section(section) => {
                if let Some(id) = &section.header.id {
                    used.insert(id.clone());
                }
                collect_explicit_ids(&section.content, used);
            },
            Block::QuotedBlock { content } => collect_explicit_ids(content, used),
            _ => {},
        }
    }
}

/// Replace decorated headers with leveled ones, promote the title, assign ids.
fn level_headers(blocks: Vec<Block>, promote_title: bool, slugs: &mut SlugRegistry) -> Vec<Block> {
    let mut levels: HashMap<Decoration, usize> = HashMap::new();
    let mut max_level = 0_usize;
    let mut title_pending = promote_title;
    let mut out = Vec::with_capacity(blocks.len());

    for block in blocks {
        let header = match block {
            Block::Header(header) => header,
            Block::DecoratedHeader(decorated) => {
                if title_pending {
                    title_pending = false;
                    out.push(promote(decorated.content, decorated.id, slugs));
                    continue;
                }
                let level = *levels.entry(decorated.decoration).or_insert_with(|| {
                    max_level = max_level.saturating_add(1);
                    return max_level;
                });
                Header {
                    content: decorated.content,
                    id: decorated.id,
                    level,
                }
            },
            other => {
                out.push(other);
                continue;
            },
        };

        if title_pending {
            title_pending = false;
            out.push(promote(header.content, header.id, slugs));
            continue;
        }
        let id = slugs.assign(header.id, &header.content);
        out.push(Block::Header(Header {
            id: Some(id),
            ..header
        }));
    }

    return out;
}

/// Build the title block for the first header.
fn promote(content: Vec<Span>, id: Option<String>, slugs: &mut SlugRegistry) -> Block {
    let id = slugs.assign(id, &content);
    debug!(%id, "promoted first header to title");
    return Block::Title(Title {
        content,
        id: Some(id),
    });
}

/// Group leveled headers and the blocks after them into nested sections.
///
/// A stack holds the open sections; a header closes every open section of the
/// same or a deeper level before opening its own.
fn nest_sections(blocks: Vec<Block>) -> Vec<Block> {
    let mut out = Vec::new();
    let mut open: Vec<Section> = Vec::new();

    for block in blocks {
        match block {
            Block::Header(header) => {
                while let Some(top) = open.last()
                    && top.header.level >= header.level
                {
                    close_top(&mut open, &mut out);
                }
                open.push(Section {
                    content: Vec::new(),
                    header,
                });
            },
            other => match open.last_mut() {
                Some(top) => top.content.push(other),
                None => out.push(other),
            },
        }
    }

    while !open.is_empty() {
        close_top(&mut open, &mut out);
    }
    return out;
}

/// Pop the innermost open section and attach it to its parent or the output.
fn close_top(open: &mut Vec<Section>, out: &mut Vec<Block>) {
    let Some(done) = open.pop() else {
        return;
    };
    match open.last_mut() {
        Some(parent) => parent.content.push(Block::Section(done)),
        None => out.push(Block::Section(done)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decorated(symbol: char, text: &str) -> Block {
        return Block::DecoratedHeader(DecoratedHeader {
            content: vec![Span::text(text)],
            decoration: Decoration {
                overline: false,
                symbol,
            },
            id: None,
        });
    }

    fn header(level: usize, text: &str) -> Block {
        return Block::Header(Header {
            content: vec![Span::text(text)],
            id: None,
            level,
        });
    }

    fn section(block: &Block) -> &Section {
        match block {
            Block::Section(section) => return section,
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn simple_heading() {
        assert_eq!(slugify("Architecture"), "architecture");
    }

    #[test]
    fn special_chars() {
        assert_eq!(slugify("What's New?"), "what-s-new");
    }

    #[test]
    fn consecutive_spaces() {
        assert_eq!(slugify("  Hello   World  "), "hello-world");
    }

    #[test]
    fn decorated_headers_with_title() {
        let blocks = vec![
            decorated('#', "Title"),
            decorated('#', "First"),
            decorated('-', "Nested"),
            Block::paragraph("body"),
            decorated('#', "Second"),
        ];
        let out = build_outline(blocks, true);

        assert_eq!(out.len(), 3);
        assert!(matches!(&out[0], Block::Title(t) if t.id.as_deref() == Some("title")));

        let first = section(&out[1]);
        assert_eq!(first.header.level, 1);
        assert_eq!(first.content.len(), 1);
        let nested = section(&first.content[0]);
        assert_eq!(nested.header.level, 2);
        assert_eq!(nested.content, vec![Block::paragraph("body")]);

        let second = section(&out[2]);
        assert_eq!(second.header.level, 1);
        assert!(second.content.is_empty());
    }

    #[test]
    fn first_header_stays_section_without_title_promotion() {
        let out = build_outline(vec![decorated('=', "Intro"), decorated('-', "Sub")], false);
        assert_eq!(out.len(), 1);
        let intro = section(&out[0]);
        assert_eq!(intro.header.level, 1);
        assert_eq!(section(&intro.content[0]).header.level, 2);
    }

    #[test]
    fn overline_is_a_distinct_decoration() {
        let over = Block::DecoratedHeader(DecoratedHeader {
            content: vec![Span::text("Over")],
            decoration: Decoration {
                overline: true,
                symbol: '=',
            },
            id: None,
        });
        let out = build_outline(vec![over, decorated('=', "Under")], false);
        let top = section(&out[0]);
        assert_eq!(section(&top.content[0]).header.level, 2);
    }

    #[test]
    fn blocks_before_first_header_stay_top_level() {
        let out = build_outline(vec![Block::paragraph("intro"), header(2, "A"), header(1, "B")], false);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Block::paragraph("intro"));
        assert_eq!(section(&out[1]).header.level, 2);
        assert_eq!(section(&out[2]).header.level, 1);
    }

    #[test]
    fn duplicate_slugs_are_disambiguated() {
        let out = build_outline(
            vec![
                Block::InternalLinkTarget { id: "setup".to_string() },
                header(1, "Setup"),
                header(1, "Setup"),
            ],
            false,
        );
        assert_eq!(section(&out[1]).header.id.as_deref(), Some("setup-1"));
        assert_eq!(section(&out[2]).header.id.as_deref(), Some("setup-2"));
    }

    #[test]
    fn empty_slug_falls_back() {
        let out = build_outline(vec![header(1, "!!!")], false);
        assert_eq!(section(&out[0]).header.id.as_deref(), Some("section"));
    }

    #[test]
    fn rebuilding_is_a_no_op() {
        let once = build_outline(vec![decorated('=', "T"), header(1, "A"), Block::paragraph("x")], true);
        let twice = build_outline(once.clone(), true);
        assert_eq!(once, twice);
    }
}
