//! Typed records built from hh.ru payloads.
//!
//! Mapping is pure: a payload either becomes a record or a [`MappingError`]
//! naming the record, the field and the rule it broke. Batch helpers log
//! every skip and keep going.

pub mod employer;
pub mod vacancy;

use std::fmt;

use serde_json::Value;

pub use employer::{Employer, map_employer, map_employers};
pub use vacancy::{MappingRules, Salary, Vacancy, map_vacancies, map_vacancy};

/// Width of the `VARCHAR` key columns holding hh.ru identifiers.
pub const ID_MAX_DIGITS: usize = 20;

/// Why a single payload was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} {record} skipped: field '{field}' {rule}")]
pub struct MappingError {
    pub kind: &'static str,
    pub record: String,
    pub field: &'static str,
    pub rule: Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Missing,
    WrongType,
    Empty,
    TooLong { max: usize },
    ForbiddenCharacter(char),
    NotNumeric,
    InvalidUrl,
    Negative,
    OutOfRange,
    InvertedRange,
    InvalidCurrency,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Missing => write!(f, "is missing"),
            Rule::WrongType => write!(f, "has the wrong type"),
            Rule::Empty => write!(f, "is empty"),
            Rule::TooLong { max } => write!(f, "is longer than {max} characters"),
            Rule::ForbiddenCharacter(c) => write!(f, "contains forbidden character {c:?}"),
            Rule::NotNumeric => write!(f, "is not a numeric identifier"),
            Rule::InvalidUrl => write!(f, "is not an http(s) URL"),
            Rule::Negative => write!(f, "is negative"),
            Rule::OutOfRange => write!(f, "is out of range"),
            Rule::InvertedRange => write!(f, "lower bound exceeds upper bound"),
            Rule::InvalidCurrency => write!(f, "is not a 3-letter currency code"),
        }
    }
}

/// Field readers shared by the employer and vacancy mappers. Each one
/// carries the record label so failures stay attributable.
pub(crate) struct Fields<'a> {
    kind: &'static str,
    record: String,
    raw: &'a Value,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(kind: &'static str, raw: &'a Value) -> Self {
        let record = raw
            .get("id")
            .and_then(id_text)
            .unwrap_or_else(|| "<unknown>".to_string());
        Self { kind, record, raw }
    }

    pub(crate) fn fail(&self, field: &'static str, rule: Rule) -> MappingError {
        MappingError {
            kind: self.kind,
            record: self.record.clone(),
            field,
            rule,
        }
    }

    /// Numeric identifier sent either as a string or a JSON number.
    pub(crate) fn id(&self, value: Option<&Value>, field: &'static str) -> Result<String, MappingError> {
        let value = present(value).ok_or_else(|| self.fail(field, Rule::Missing))?;
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n
                .as_u64()
                .map(|n| n.to_string())
                .ok_or_else(|| self.fail(field, Rule::NotNumeric))?,
            _ => return Err(self.fail(field, Rule::WrongType)),
        };
        if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
            return Err(self.fail(field, Rule::NotNumeric));
        }
        if text.len() > ID_MAX_DIGITS {
            return Err(self.fail(field, Rule::TooLong { max: ID_MAX_DIGITS }));
        }
        Ok(text)
    }

    /// Required text: trimmed, non-empty and bounded.
    pub(crate) fn text(&self, field: &'static str, max: usize) -> Result<String, MappingError> {
        let value = present(self.raw.get(field)).ok_or_else(|| self.fail(field, Rule::Missing))?;
        let text = value
            .as_str()
            .ok_or_else(|| self.fail(field, Rule::WrongType))?
            .trim();
        if text.is_empty() {
            return Err(self.fail(field, Rule::Empty));
        }
        if text.chars().count() > max {
            return Err(self.fail(field, Rule::TooLong { max }));
        }
        Ok(text.to_string())
    }

    /// Like [`Fields::text`], but also free of control characters and markup.
    pub(crate) fn display_name(&self, field: &'static str, max: usize) -> Result<String, MappingError> {
        let text = self.text(field, max)?;
        if let Some(c) = text.chars().find(|c| c.is_control() || matches!(c, '<' | '>')) {
            return Err(self.fail(field, Rule::ForbiddenCharacter(c)));
        }
        Ok(text)
    }

    /// Absolute http(s) URL, returned in normalized form (lowercase scheme
    /// and host) so it passes the store's `^https?://` check.
    pub(crate) fn url(&self, field: &'static str) -> Result<String, MappingError> {
        let value = present(self.raw.get(field)).ok_or_else(|| self.fail(field, Rule::Missing))?;
        let text = value.as_str().ok_or_else(|| self.fail(field, Rule::WrongType))?.trim();
        match url::Url::parse(text) {
            Ok(parsed)
                if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() =>
            {
                Ok(parsed.into())
            }
            _ => Err(self.fail(field, Rule::InvalidUrl)),
        }
    }

    /// Non-negative integer that fits the `INT` columns of the store.
    pub(crate) fn amount(&self, value: Option<&Value>, field: &'static str) -> Result<Option<i32>, MappingError> {
        let Some(value) = present(value) else {
            return Ok(None);
        };
        let number = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| self.fail(field, Rule::WrongType))?,
            _ => return Err(self.fail(field, Rule::WrongType)),
        };
        if number < 0 {
            return Err(self.fail(field, Rule::Negative));
        }
        i32::try_from(number)
            .map(Some)
            .map_err(|_| self.fail(field, Rule::OutOfRange))
    }
}

/// Treats JSON `null` like an absent key.
pub(crate) fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Optional string, `None` for null, absent or non-string values.
pub(crate) fn optional_str(value: Option<&Value>) -> Option<String> {
    present(value)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Reads `{ "name": ... }` style nested dictionaries (area, experience, schedule).
pub(crate) fn nested_name(raw: &Value, key: &str) -> Option<String> {
    optional_str(raw.get(key).and_then(|v| v.get("name")))
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
