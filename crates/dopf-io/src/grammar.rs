//! Element tree for the tag-based input files.
//!
//! Every input file is a single root element whose children are either
//! further elements or whitespace-separated values. The reader keeps only
//! tag names, text and nesting; attributes are not used by any file.

use std::str::FromStr;

use quick_xml::{events::Event, Reader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("malformed markup: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("tag is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("document has no root element")]
    Empty,

    #[error("unexpected second root element <{0}>")]
    MultipleRoots(String),

    #[error("element <{0}> is never closed")]
    Unclosed(String),

    #[error("expected root <{expected}>, found <{found}>")]
    UnexpectedRoot { expected: String, found: String },

    #[error("<{parent}> is missing <{tag}>")]
    MissingTag { parent: String, tag: String },

    #[error("invalid value '{value}' in <{tag}>")]
    Value { tag: String, value: String },

    #[error("<{tag}> needs {expected} values, found {found}")]
    Count {
        tag: String,
        expected: usize,
        found: usize,
    },
}

/// One tag with its text and nested tags, in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Fail unless this element is a `<tag>`.
    pub fn expect_tag(&self, tag: &str) -> Result<&Self, GrammarError> {
        if self.tag == tag {
            Ok(self)
        } else {
            Err(GrammarError::UnexpectedRoot {
                expected: tag.to_string(),
                found: self.tag.clone(),
            })
        }
    }

    /// First child named `tag`.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.tag == tag)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    pub fn required(&self, tag: &str) -> Result<&Element, GrammarError> {
        self.child(tag).ok_or_else(|| GrammarError::MissingTag {
            parent: self.tag.clone(),
            tag: tag.to_string(),
        })
    }

    /// Trimmed text of the required child `tag`.
    pub fn text_of(&self, tag: &str) -> Result<&str, GrammarError> {
        Ok(self.required(tag)?.text.trim())
    }

    /// This element's text parsed as a single value.
    pub fn value<T: FromStr>(&self) -> Result<T, GrammarError> {
        let text = self.text.trim();
        text.parse().map_err(|_| GrammarError::Value {
            tag: self.tag.clone(),
            value: text.to_string(),
        })
    }

    /// Exactly `count` whitespace-separated values from this element's text.
    pub fn values<T: FromStr>(&self, count: usize) -> Result<Vec<T>, GrammarError> {
        let tokens: Vec<&str> = self.text.split_whitespace().collect();
        if tokens.len() != count {
            return Err(GrammarError::Count {
                tag: self.tag.clone(),
                expected: count,
                found: tokens.len(),
            });
        }
        tokens
            .into_iter()
            .map(|token| {
                token.parse().map_err(|_| GrammarError::Value {
                    tag: self.tag.clone(),
                    value: token.to_string(),
                })
            })
            .collect()
    }
}

/// Parse a whole document into its root element.
pub fn parse_document(input: &str) -> Result<Element, GrammarError> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let name = e.local_name();
                stack.push(Element::new(std::str::from_utf8(name.as_ref())?));
            }
            Event::Empty(ref e) => {
                let name = e.local_name();
                let element = Element::new(std::str::from_utf8(name.as_ref())?);
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                if let Some(open) = stack.last_mut() {
                    let text = e.unescape()?;
                    if !open.text.is_empty() {
                        open.text.push(' ');
                    }
                    open.text.push_str(text.trim());
                }
            }
            Event::End(_) => {
                // end names are checked by the reader
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(GrammarError::Unclosed(open.tag));
    }
    root.ok_or(GrammarError::Empty)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), GrammarError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(GrammarError::MultipleRoots(element.tag)),
    }
    Ok(())
}

/// Minutes since midnight from an `H:MM` clock string.
pub fn parse_clock(text: &str) -> Result<f64, GrammarError> {
    let invalid = || GrammarError::Value {
        tag: "clock".to_string(),
        value: text.to_string(),
    };
    let (hours, minutes) = text.trim().split_once(':').ok_or_else(invalid)?;
    let hours: f64 = hours.parse().map_err(|_| invalid())?;
    let minutes: f64 = minutes.parse().map_err(|_| invalid())?;
    Ok(hours * 60.0 + minutes)
}

/// Smallest multiple of `period` that is at least `minutes`.
pub fn round_up_to_period(minutes: f64, period: f64) -> f64 {
    if period <= 0.0 {
        return minutes;
    }
    let mut slots = (minutes / period).trunc();
    if slots * period < minutes {
        slots += 1.0;
    }
    slots * period
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_document() {
        let root = parse_document(
            "<network>\n  <bus> <name> b1 </name> <coordinate> 1 2.5 </coordinate> </bus>\n</network>",
        )
        .unwrap();
        assert_eq!(root.tag, "network");
        let bus = root.required("bus").unwrap();
        assert_eq!(bus.text_of("name").unwrap(), "b1");
        assert_eq!(
            bus.required("coordinate").unwrap().values::<f64>(2).unwrap(),
            vec![1.0, 2.5]
        );
    }

    #[test]
    fn test_value_count_checked() {
        let root = parse_document("<b> 1 2 3 </b>").unwrap();
        let err = root.values::<f64>(4).unwrap_err();
        assert!(matches!(err, GrammarError::Count { expected: 4, found: 3, .. }));
        let err = parse_document("<b> 1 x </b>").unwrap().values::<f64>(2).unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_unbalanced_document_rejected() {
        assert!(parse_document("<network> <bus> </network>").is_err());
        assert!(matches!(
            parse_document("<a></a><b></b>"),
            Err(GrammarError::MultipleRoots(_))
        ));
        assert!(matches!(parse_document("   "), Err(GrammarError::Empty)));
    }

    #[test]
    fn test_missing_tag_names_parent() {
        let root = parse_document("<line><name>l1</name></line>").unwrap();
        let err = root.text_of("phase").unwrap_err();
        assert_eq!(err.to_string(), "<line> is missing <phase>");
    }

    #[test]
    fn test_clock_and_rounding() {
        assert_eq!(parse_clock("7:05").unwrap(), 425.0);
        assert!(parse_clock("705").is_err());
        assert_eq!(round_up_to_period(425.0, 15.0), 435.0);
        assert_eq!(round_up_to_period(420.0, 15.0), 420.0);
    }
}
