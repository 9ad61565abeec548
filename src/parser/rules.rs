//! Extraction rules
//!
//! A rule runs one regex `search` over the whole text. The shape of the
//! pattern decides the result:
//!
//! | pattern                  | no match            | match                       |
//! |--------------------------|---------------------|-----------------------------|
//! | no capturing group       | `Matched(false)`    | `Matched(true)`             |
//! | one group                | absent              | `Group(text)`               |
//! | several groups           | absent              | `Groups([..])`              |
//! | named (see [`Find::named`]) | absent           | `Named({name: text})`       |

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::{Regex, RegexBuilder};

use crate::common::{Error, Result};

/// A value extractor over raw text
///
/// `Ok(None)` means the rule found nothing and the field falls back to its
/// default. Adapters compose statically, like iterator adapters.
pub trait Rule {
    type Output;

    fn extract(&self, text: &str) -> Result<Option<Self::Output>>;

    /// Transform a present value
    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Output) -> U,
    {
        Map { rule: self, f }
    }

    /// Transform a present value with a fallible conversion
    fn try_map<F, U>(self, f: F) -> TryMap<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Output) -> Result<U>,
    {
        TryMap { rule: self, f }
    }
}

/// Rule adapter created by [`Rule::map`]
#[derive(Debug, Clone)]
pub struct Map<R, F> {
    rule: R,
    f: F,
}

impl<R, F, U> Rule for Map<R, F>
where
    R: Rule,
    F: Fn(R::Output) -> U,
{
    type Output = U;

    fn extract(&self, text: &str) -> Result<Option<U>> {
        Ok(self.rule.extract(text)?.map(&self.f))
    }
}

/// Rule adapter created by [`Rule::try_map`]
#[derive(Debug, Clone)]
pub struct TryMap<R, F> {
    rule: R,
    f: F,
}

impl<R, F, U> Rule for TryMap<R, F>
where
    R: Rule,
    F: Fn(R::Output) -> Result<U>,
{
    type Output = U;

    fn extract(&self, text: &str) -> Result<Option<U>> {
        self.rule.extract(text)?.map(&self.f).transpose()
    }
}

/// Raw result of a [`Find`] rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Matched(bool),
    Group(String),
    Groups(Vec<Option<String>>),
    Named(HashMap<String, String>),
}

impl Extracted {
    fn shape_error(&self, expected: &str) -> Error {
        Error::Internal(format!("expected {} from extraction rule, got {:?}", expected, self))
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Self::Matched(matched) => Ok(matched),
            other => Err(other.shape_error("a match flag")),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Group(text) => Ok(text),
            other => Err(other.shape_error("one group")),
        }
    }

    pub fn into_groups(self) -> Result<Vec<Option<String>>> {
        match self {
            Self::Groups(groups) => Ok(groups),
            Self::Group(text) => Ok(vec![Some(text)]),
            other => Err(other.shape_error("capture groups")),
        }
    }

    pub fn into_named(self) -> Result<HashMap<String, String>> {
        match self {
            Self::Named(map) => Ok(map),
            other => Err(other.shape_error("named groups")),
        }
    }
}

/// Compiled patterns by pattern text and multi-line flag
///
/// Parsers build their rules on every call; compiling happens once per process.
static COMPILED: LazyLock<Mutex<HashMap<(String, bool), Regex>>> = LazyLock::new(Default::default);

/// Search the text for a pattern
#[derive(Debug, Clone)]
pub struct Find {
    pattern: String,
    named: bool,
    multi_line: bool,
}

impl Find {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            named: false,
            multi_line: false,
        }
    }

    /// Return named groups as a mapping
    pub fn named(mut self) -> Self {
        self.named = true;
        self
    }

    /// `^` and `$` match at line boundaries
    pub fn multi_line(mut self) -> Self {
        self.multi_line = true;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn regex(&self) -> Result<Regex> {
        let key = (self.pattern.clone(), self.multi_line);
        let mut compiled = COMPILED.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(re) = compiled.get(&key) {
            return Ok(re.clone());
        }

        let re = RegexBuilder::new(&self.pattern)
            .multi_line(self.multi_line)
            .build()
            .map_err(|e| Error::invalid_pattern(&self.pattern, e))?;
        compiled.insert(key, re.clone());
        Ok(re)
    }

    fn search(&self, re: &Regex, text: &str) -> Option<Extracted> {
        let groups = re.captures_len() - 1;
        let Some(caps) = re.captures(text) else {
            return (groups == 0).then_some(Extracted::Matched(false));
        };

        if groups == 0 {
            return Some(Extracted::Matched(true));
        }

        if self.named {
            let map = re
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect();
            return Some(Extracted::Named(map));
        }

        if groups == 1 {
            return caps.get(1).map(|m| Extracted::Group(m.as_str().to_string()));
        }

        Some(Extracted::Groups(
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect(),
        ))
    }
}

impl Rule for Find {
    type Output = Extracted;

    fn extract(&self, text: &str) -> Result<Option<Extracted>> {
        let re = self.regex()?;
        Ok(self.search(&re, text))
    }
}

/// Integer extraction from a single-group pattern
#[derive(Debug, Clone)]
pub struct FindInt {
    find: Find,
    radix: u32,
}

impl FindInt {
    /// `^` and `$` match at line boundaries
    pub fn multi_line(mut self) -> Self {
        self.find = self.find.multi_line();
        self
    }
}

impl Rule for FindInt {
    type Output = u64;

    fn extract(&self, text: &str) -> Result<Option<u64>> {
        let re = self.find.regex()?;
        if re.captures_len() != 2 {
            return Err(Error::Internal(format!(
                "integer extraction needs exactly one capturing group: '{}'",
                self.find.pattern
            )));
        }
        match self.find.search(&re, text) {
            Some(extracted) => parse_int(&extracted.into_text()?, self.radix).map(Some),
            None => Ok(None),
        }
    }
}

/// Parse an integer in `radix`; radix 0 detects `0x`, `0o` and `0b` prefixes
pub fn parse_int(text: &str, radix: u32) -> Result<u64> {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();
    let (digits, radix) = match radix {
        0 => match lower.get(..2) {
            Some("0x") => (&trimmed[2..], 16),
            Some("0o") => (&trimmed[2..], 8),
            Some("0b") => (&trimmed[2..], 2),
            _ => (trimmed, 10),
        },
        16 if lower.starts_with("0x") => (&trimmed[2..], 16),
        8 if lower.starts_with("0o") => (&trimmed[2..], 8),
        2 if lower.starts_with("0b") => (&trimmed[2..], 2),
        2..=36 => (trimmed, radix),
        _ => return Err(Error::Internal(format!("unsupported integer base {}", radix))),
    };

    u64::from_str_radix(digits, radix)
        .map_err(|e| Error::conversion(format!("'{}' is not a base-{} integer: {}", text, radix, e)))
}

/// Search for `pattern`, returning the raw [`Extracted`] shape
pub fn find(pattern: impl Into<String>) -> Find {
    Find::new(pattern)
}

/// Whether a group-less pattern occurs in the text
pub fn flag(pattern: impl Into<String>) -> impl Rule<Output = bool> {
    find(pattern).try_map(Extracted::into_bool)
}

/// Text of the single capturing group
pub fn text(pattern: impl Into<String>) -> impl Rule<Output = String> {
    find(pattern).try_map(Extracted::into_text)
}

/// All capturing groups, in order
pub fn groups(pattern: impl Into<String>) -> impl Rule<Output = Vec<Option<String>>> {
    find(pattern).try_map(Extracted::into_groups)
}

/// Named capturing groups that took part in the match
pub fn named(pattern: impl Into<String>) -> impl Rule<Output = HashMap<String, String>> {
    find(pattern).named().try_map(Extracted::into_named)
}

/// Integer from the single capturing group, base auto-detected
pub fn find_int(pattern: impl Into<String>) -> FindInt {
    find_int_radix(pattern, 0)
}

/// Integer from the single capturing group in the given base
pub fn find_int_radix(pattern: impl Into<String>, radix: u32) -> FindInt {
    FindInt {
        find: Find::new(pattern),
        radix,
    }
}
