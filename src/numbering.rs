//! Footnote numbering: ids and display labels for footnote definitions, and
//! in-order pairing of auto-numbered and auto-symbol references.

use std::collections::HashMap;

use crate::ast::FootnoteLabel;
use crate::diagnostics::{ErrorKind, Problem};

/// Symbols handed out to auto-symbol footnotes, repeated once more per cycle.
const SYMBOLS: [char; 10] = ['*', '\u{2020}', '\u{2021}', '\u{a7}', '\u{b6}', '#', '\u{2660}', '\u{2665}', '\u{2666}', '\u{2663}'];

/// Final id and display label of one footnote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedFootnote {
    /// Rendered id.
    pub id: String,
    /// Display label.
    pub label: String,
}

/// Numbering for every footnote definition of one document.
#[derive(Debug, Clone, Default)]
pub struct FootnoteNumbering {
    /// Assignment per definition in document order; `None` for an empty label.
    assignments: Vec<Option<NumberedFootnote>>,
    /// Plain auto-number definitions in document order.
    autonumber: Vec<NumberedFootnote>,
    /// Auto-symbol definitions in document order.
    autosymbol: Vec<NumberedFootnote>,
    /// Labelled auto-number definitions; the first one wins on a repeated label.
    labelled: HashMap<String, NumberedFootnote>,
}

/// Position in the auto-number and auto-symbol definition sequences.
///
/// References consume definitions strictly in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FootnoteCursor {
    /// Next plain auto-number definition to hand out.
    autonumber: usize,
    /// Next auto-symbol definition to hand out.
    autosymbol: usize,
}

impl FootnoteNumbering {
    /// Number the definitions, given their labels in document order.
    ///
    /// Plain and labelled auto-number definitions share one display sequence
    /// starting at 1; explicit numbers and symbols are independent.
    pub fn assign<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a FootnoteLabel>,
    {
        let mut numbering = Self::default();
        let mut display = 0_usize;

        for label in labels {
            let assigned = match label {
                FootnoteLabel::Numeric { number } => Some(numeric(*number)),
                FootnoteLabel::Autonumber => {
                    display = display.saturating_add(1);
                    let footnote = NumberedFootnote {
                        id: format!("__fnauto-{display}"),
                        label: display.to_string(),
                    };
                    numbering.autonumber.push(footnote.clone());
                    Some(footnote)
                },
                FootnoteLabel::AutonumberLabel { label } if label.is_empty() => None,
                FootnoteLabel::AutonumberLabel { label } => {
                    display = display.saturating_add(1);
                    let footnote = NumberedFootnote {
                        id: format!("__fnl-{label}"),
                        label: display.to_string(),
                    };
                    numbering
                        .labelled
                        .entry(label.clone())
                        .or_insert_with(|| return footnote.clone());
                    Some(footnote)
                },
                FootnoteLabel::Autosymbol => {
                    let position = numbering.autosymbol.len();
                    let footnote = NumberedFootnote {
                        id: format!("__fns-{}", position.saturating_add(1)),
                        label: autosymbol(position),
                    };
                    numbering.autosymbol.push(footnote.clone());
                    Some(footnote)
                },
            };
            numbering.assignments.push(assigned);
        }

        return numbering;
    }

    /// Assignment of the definition at `ordinal` (document order).
    pub fn definition(&self, ordinal: usize) -> Option<&NumberedFootnote> {
        return self.assignments.get(ordinal).and_then(Option::as_ref);
    }

    /// Assignment of the labelled auto-number definition `label`.
    pub fn labelled(&self, label: &str) -> Option<&NumberedFootnote> {
        return self.labelled.get(label);
    }
}

impl FootnoteCursor {
    /// Pair the next auto-number reference with its definition.
    ///
    /// # Errors
    ///
    /// Returns a `TooManyAutoNumberReferences` problem once the definitions run out.
    pub fn next_autonumber<'a>(&mut self, numbering: &'a FootnoteNumbering) -> Result<&'a NumberedFootnote, Problem> {
        let position = self.autonumber;
        self.autonumber = position.saturating_add(1);
        return numbering.autonumber.get(position).ok_or_else(|| {
            return Problem::new(ErrorKind::TooManyAutoNumberReferences, "too many autonumber references");
        });
    }

    /// Pair the next auto-symbol reference with its definition.
    ///
    /// # Errors
    ///
    /// Returns a `TooManyAutoSymbolReferences` problem once the definitions run out.
    pub fn next_autosymbol<'a>(&mut self, numbering: &'a FootnoteNumbering) -> Result<&'a NumberedFootnote, Problem> {
        let position = self.autosymbol;
        self.autosymbol = position.saturating_add(1);
        return numbering.autosymbol.get(position).ok_or_else(|| {
            return Problem::new(ErrorKind::TooManyAutoSymbolReferences, "too many autosymbol references");
        });
    }
}

/// Id and label of the footnote with explicit number `number`.
pub fn numeric(number: u32) -> NumberedFootnote {
    return NumberedFootnote {
        id: format!("__fn-{number}"),
        label: number.to_string(),
    };
}

/// Symbol for the auto-symbol footnote at zero-based `position`.
pub fn autosymbol(position: usize) -> String {
    let cycle = position.checked_div(SYMBOLS.len()).unwrap_or(0);
    let slot = position.checked_rem(SYMBOLS.len()).unwrap_or(0);
    let symbol = SYMBOLS.get(slot).copied().unwrap_or('*');
    return std::iter::repeat_n(symbol, cycle.saturating_add(1)).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_repeat_per_cycle() {
        assert_eq!(autosymbol(0), "*");
        assert_eq!(autosymbol(1), "\u{2020}");
        assert_eq!(autosymbol(9), "\u{2663}");
        assert_eq!(autosymbol(10), "**");
        assert_eq!(autosymbol(21), "\u{2020}\u{2020}\u{2020}");
    }

    #[test]
    fn autonumber_and_labelled_share_display_sequence() {
        let labels = [
            FootnoteLabel::Autonumber,
            FootnoteLabel::AutonumberLabel {
                label: "note".to_string(),
            },
            FootnoteLabel::Numeric { number: 7 },
            FootnoteLabel::Autonumber,
        ];
        let numbering = FootnoteNumbering::assign(&labels);

        assert_eq!(numbering.definition(0).unwrap().label, "1");
        assert_eq!(numbering.definition(1).unwrap().id, "__fnl-note");
        assert_eq!(numbering.definition(1).unwrap().label, "2");
        assert_eq!(numbering.definition(2).unwrap().id, "__fn-7");
        assert_eq!(numbering.definition(3).unwrap().id, "__fnauto-3");
        assert_eq!(numbering.labelled("note").unwrap().label, "2");
    }

    #[test]
    fn surplus_autonumber_references_fail_in_order() {
        let labels = [FootnoteLabel::Autonumber, FootnoteLabel::Autonumber];
        let numbering = FootnoteNumbering::assign(&labels);
        let mut cursor = FootnoteCursor::default();

        let results: Vec<_> = (0..3).map(|_| cursor.next_autonumber(&numbering).map(|f| f.label.clone())).collect();
        assert_eq!(results[0], Ok("1".to_string()));
        assert_eq!(results[1], Ok("2".to_string()));
        assert_eq!(
            results[2].as_ref().unwrap_err().kind,
            ErrorKind::TooManyAutoNumberReferences
        );
    }

    #[test]
    fn autosymbol_references_pair_in_order() {
        let labels = [FootnoteLabel::Autosymbol, FootnoteLabel::Autosymbol];
        let numbering = FootnoteNumbering::assign(&labels);
        let mut cursor = FootnoteCursor::default();

        assert_eq!(cursor.next_autosymbol(&numbering).unwrap().id, "__fns-1");
        assert_eq!(cursor.next_autosymbol(&numbering).unwrap().label, "\u{2020}");
        assert!(cursor.next_autosymbol(&numbering).is_err());
    }

    #[test]
    fn empty_label_is_unassigned() {
        let labels = [FootnoteLabel::AutonumberLabel { label: String::new() }];
        assert!(FootnoteNumbering::assign(&labels).definition(0).is_none());
    }
}
