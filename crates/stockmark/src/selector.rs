//! Compound element selectors.
//!
//! Supports the subset the engine needs to find option controls and their
//! wrappers: an optional tag (or `*`), any number of `.class` parts and
//! `[attr]` / `[attr=value]` parts. Combinators and selector lists are not
//! supported; fallbacks are expressed as ordered lists of selectors instead.

use crate::result::{StockmarkError, StockmarkResult};
use std::fmt;
use std::str::FromStr;

/// Anything a selector can be matched against
pub trait Matchable {
    /// Lower-case tag name
    fn tag_name(&self) -> &str;
    /// Whether the element carries a class
    fn has_class(&self, class: &str) -> bool;
    /// Attribute value, if present
    fn attribute(&self, name: &str) -> Option<&str>;
}

/// Attribute requirement within a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatch {
    /// Attribute name
    pub name: String,
    /// Required value; `None` only requires presence
    pub value: Option<String>,
}

/// A parsed compound selector such as `input.choice[type=radio]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

impl Selector {
    /// Selector matching a tag name
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into().to_ascii_lowercase()),
            ..Self::default()
        }
    }

    /// Selector matching a class
    #[must_use]
    pub fn class(class: impl Into<String>) -> Self {
        Self::default().and_class(class)
    }

    /// Selector matching attribute presence
    #[must_use]
    pub fn attr(name: impl Into<String>) -> Self {
        Self::default().and_attr(name, None::<String>)
    }

    /// Add a class requirement
    #[must_use]
    pub fn and_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Add an attribute requirement
    #[must_use]
    pub fn and_attr(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.attrs.push(AttrMatch {
            name: name.into(),
            value: value.map(Into::into),
        });
        self
    }

    /// Parse selector text
    ///
    /// # Errors
    ///
    /// Returns [`StockmarkError::Selector`] on empty or malformed input
    pub fn parse(text: &str) -> StockmarkResult<Self> {
        let fail = |message: &str| StockmarkError::Selector {
            selector: text.to_string(),
            message: message.to_string(),
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(fail("empty selector"));
        }

        let mut selector = Self::default();
        let mut chars = trimmed.chars().peekable();

        if chars.peek() == Some(&'*') {
            chars.next();
        } else {
            let tag = take_ident(&mut chars);
            if !tag.is_empty() {
                selector.tag = Some(tag.to_ascii_lowercase());
            }
        }

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let class = take_ident(&mut chars);
                    if class.is_empty() {
                        return Err(fail("expected class name after '.'"));
                    }
                    selector.classes.push(class);
                }
                '[' => {
                    let name = take_ident(&mut chars);
                    if name.is_empty() {
                        return Err(fail("expected attribute name after '['"));
                    }
                    let value = match chars.next() {
                        Some(']') => None,
                        Some('=') => {
                            let value = take_attr_value(&mut chars);
                            if chars.next() != Some(']') {
                                return Err(fail("unterminated attribute"));
                            }
                            Some(value)
                        }
                        _ => return Err(fail("unterminated attribute")),
                    };
                    selector.attrs.push(AttrMatch { name, value });
                }
                c if c.is_whitespace() || c == '>' || c == ',' => {
                    return Err(fail("combinators and selector lists are not supported"));
                }
                other => return Err(fail(&format!("unexpected character {other:?}"))),
            }
        }

        Ok(selector)
    }

    /// Whether `element` satisfies every part of the selector
    pub fn matches<M: Matchable + ?Sized>(&self, element: &M) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag_name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.classes.iter().all(|c| element.has_class(c))
            && self.attrs.iter().all(|a| match (&a.value, element.attribute(&a.name)) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(want), Some(have)) => want == have,
            })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

fn take_attr_value(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    match chars.peek() {
        Some(&quote) if quote == '"' || quote == '\'' => {
            chars.next();
            let mut out = String::new();
            for c in chars.by_ref() {
                if c == quote {
                    break;
                }
                out.push(c);
            }
            out
        }
        _ => {
            let mut out = String::new();
            while let Some(&c) = chars.peek() {
                if c == ']' {
                    break;
                }
                out.push(c);
                chars.next();
            }
            out
        }
    }
}

impl FromStr for Selector {
    type Err = StockmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{tag}")?,
            None if self.classes.is_empty() && self.attrs.is_empty() => write!(f, "*")?,
            None => {}
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        for attr in &self.attrs {
            match &attr.value {
                Some(v) => write!(f, "[{}=\"{v}\"]", attr.name)?,
                None => write!(f, "[{}]", attr.name)?,
            }
        }
        Ok(())
    }
}
