//! CSS-style selector subset
//!
//! Supports type, universal, id, class and attribute selectors joined by
//! descendant or child combinators, plus comma separated selector lists.
//! Selectors are compiled once (at configuration load) and matched against
//! any element view implementing [`SelectorElement`].

use std::fmt;
use thiserror::Error;

/// Errors produced while compiling a selector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// Selector string (or one entry of a selector list) is blank
    #[error("empty selector in {selector:?}")]
    Empty { selector: String },
    /// A character that the supported grammar does not accept
    #[error("unexpected {found:?} at offset {offset} in selector {selector:?}")]
    Unexpected {
        selector: String,
        found: char,
        offset: usize,
    },
    /// Input ended in the middle of a construct
    #[error("unexpected end of selector {selector:?}")]
    UnexpectedEnd { selector: String },
    /// An identifier was required but none was found
    #[error("expected a name at offset {offset} in selector {selector:?}")]
    ExpectedName { selector: String, offset: usize },
}

/// Read-only view of an element for selector matching
pub trait SelectorElement: Copy {
    /// Lowercase tag name
    fn tag_name(&self) -> &str;
    /// Attribute value by name
    fn attribute(&self, name: &str) -> Option<&str>;
    /// Parent element, if attached to one
    fn parent_element(&self) -> Option<Self>;
}

/// A compiled selector list
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    alternatives: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq)]
struct ComplexSelector {
    /// Compounds left to right; the combinator links each compound to the previous one
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeMatch>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeMatch {
    name: String,
    operator: AttributeOperator,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOperator {
    Exists,
    Equals,
    Includes,
    Prefix,
    Suffix,
    Contains,
}

impl Selector {
    /// Compile a selector string
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser {
            source,
            chars: source.char_indices().collect(),
            index: 0,
        };
        let alternatives = parser.selector_list()?;
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    /// The selector text this was compiled from
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the element matches any selector of the list
    pub fn matches<E: SelectorElement>(&self, element: E) -> bool {
        self.alternatives
            .iter()
            .any(|complex| matches_parts(&complex.parts, element))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn matches_parts<E: SelectorElement>(parts: &[(Combinator, Compound)], element: E) -> bool {
    let Some(((combinator, last), rest)) = parts.split_last() else {
        return false;
    };
    if !last.matches(element) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }

    match combinator {
        Combinator::Child => element
            .parent_element()
            .is_some_and(|parent| matches_parts(rest, parent)),
        Combinator::Descendant => {
            let mut ancestor = element.parent_element();
            while let Some(candidate) = ancestor {
                if matches_parts(rest, candidate) {
                    return true;
                }
                ancestor = candidate.parent_element();
            }
            false
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
    }

    fn matches<E: SelectorElement>(&self, element: E) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !element.tag_name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = element.attribute("class").unwrap_or_default();
            if !self
                .classes
                .iter()
                .all(|class| class_attr.split_ascii_whitespace().any(|candidate| candidate == class))
            {
                return false;
            }
        }
        self.attributes.iter().all(|attr| attr.matches(element))
    }
}

impl AttributeMatch {
    fn matches<E: SelectorElement>(&self, element: E) -> bool {
        let Some(actual) = element.attribute(&self.name) else {
            return false;
        };
        let expected = self.value.as_str();
        match self.operator {
            AttributeOperator::Exists => true,
            AttributeOperator::Equals => actual == expected,
            AttributeOperator::Includes => actual.split_ascii_whitespace().any(|word| word == expected),
            // Empty values never match the substring operators
            AttributeOperator::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttributeOperator::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttributeOperator::Contains => !expected.is_empty() && actual.contains(expected),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.index;
        while self.peek().is_some_and(char::is_whitespace) {
            self.index += 1;
        }
        self.index > start
    }

    fn unexpected(&self) -> SelectorError {
        match self.peek() {
            Some(found) => SelectorError::Unexpected {
                selector: self.source.to_string(),
                found,
                offset: self.offset(),
            },
            None => SelectorError::UnexpectedEnd {
                selector: self.source.to_string(),
            },
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), SelectorError> {
        if self.peek() == Some(wanted) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn selector_list(&mut self) -> Result<Vec<ComplexSelector>, SelectorError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_whitespace();
            if matches!(self.peek(), None | Some(',')) {
                return Err(SelectorError::Empty {
                    selector: self.source.to_string(),
                });
            }
            alternatives.push(self.complex()?);
            match self.peek() {
                None => return Ok(alternatives),
                Some(',') => {
                    self.index += 1;
                }
                Some(_) => return Err(self.unexpected()),
            }
        }
    }

    /// Parses up to (not including) a top-level comma or the end of input
    fn complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;

        loop {
            let compound = self.compound()?;
            parts.push((combinator, compound));

            let had_whitespace = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => return Ok(ComplexSelector { parts }),
                Some('>') => {
                    self.index += 1;
                    self.skip_whitespace();
                    combinator = Combinator::Child;
                }
                Some(_) if had_whitespace => combinator = Combinator::Descendant,
                Some(_) => return Err(self.unexpected()),
            }
        }
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();

        if self.peek() == Some('*') {
            self.index += 1;
            compound.tag = Some("*".to_string());
        } else if self.peek().is_some_and(is_name_char) {
            compound.tag = Some(self.name()?.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.index += 1;
                    compound.classes.push(self.name()?);
                }
                Some('#') => {
                    self.index += 1;
                    compound.id = Some(self.name()?);
                }
                Some('[') => {
                    self.index += 1;
                    compound.attributes.push(self.attribute()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() {
            return Err(self.unexpected());
        }
        Ok(compound)
    }

    fn name(&mut self) -> Result<String, SelectorError> {
        let start = self.index;
        while self.peek().is_some_and(is_name_char) {
            self.index += 1;
        }
        if self.index == start {
            return Err(SelectorError::ExpectedName {
                selector: self.source.to_string(),
                offset: self.offset(),
            });
        }
        Ok(self.chars[start..self.index].iter().map(|(_, c)| *c).collect())
    }

    fn attribute(&mut self) -> Result<AttributeMatch, SelectorError> {
        self.skip_whitespace();
        let name = self.name()?.to_ascii_lowercase();
        self.skip_whitespace();

        let operator = match self.bump() {
            Some(']') => {
                return Ok(AttributeMatch {
                    name,
                    operator: AttributeOperator::Exists,
                    value: String::new(),
                });
            }
            Some('=') => AttributeOperator::Equals,
            Some(prefix @ ('~' | '^' | '$' | '*')) => {
                self.expect('=')?;
                match prefix {
                    '~' => AttributeOperator::Includes,
                    '^' => AttributeOperator::Prefix,
                    '$' => AttributeOperator::Suffix,
                    _ => AttributeOperator::Contains,
                }
            }
            Some(_) => {
                self.index -= 1;
                return Err(self.unexpected());
            }
            None => return Err(self.unexpected()),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.index += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => return Err(self.unexpected()),
                    }
                }
                value
            }
            _ => self.name()?,
        };
        self.skip_whitespace();
        self.expect(']')?;

        Ok(AttributeMatch { name, operator, value })
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}
