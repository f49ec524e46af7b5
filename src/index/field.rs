use super::config::{DeclaredField, FieldRole, FieldType};
use super::counters::{MappedDocument, PathCounters};
use super::schema::SchemaError;
use crate::xpath::QName;
use std::cmp::Ordering;
use tracing::trace;

/// Where a field's values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Uri,
    Document,
    PathOccurrences,
    ElementNames,
    AttributeNames,
    ElementText,
    AttributeText,
    FullText,
    PathValues,
    /// String value of every element with this name
    Element(QName),
    /// Value of every attribute with this name
    Attribute(QName),
}

impl ValueSource {
    pub fn for_role(role: FieldRole) -> Self {
        match role {
            FieldRole::Uri => ValueSource::Uri,
            FieldRole::Document => ValueSource::Document,
            FieldRole::Path => ValueSource::PathOccurrences,
            FieldRole::EltQName => ValueSource::ElementNames,
            FieldRole::AttQName => ValueSource::AttributeNames,
            FieldRole::ElementText => ValueSource::ElementText,
            FieldRole::AttributeText => ValueSource::AttributeText,
            FieldRole::FullText => ValueSource::FullText,
            FieldRole::PathValue => ValueSource::PathValues,
        }
    }
}

/// One field of the index schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    /// Built-in role, `None` for declared fields
    pub role: Option<FieldRole>,
    pub field_type: FieldType,
    pub source: ValueSource,
}

impl FieldDefinition {
    pub fn for_role(role: FieldRole, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Some(role),
            field_type: role.field_type(),
            source: ValueSource::for_role(role),
        }
    }

    pub fn declared(decl: &DeclaredField) -> Result<Self, SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidField {
            name: decl.name.clone(),
            reason: reason.to_string(),
        };
        if !matches!(decl.field_type, FieldType::String | FieldType::Int) {
            return Err(invalid("declared fields must be string or int"));
        }
        let source = match (&decl.element, &decl.attribute) {
            (Some(element), None) => ValueSource::Element(QName::parse(element)),
            (None, Some(attribute)) => ValueSource::Attribute(QName::parse(attribute)),
            _ => return Err(invalid("exactly one of element or attribute is required")),
        };
        Ok(Self {
            name: decl.name.clone(),
            role: None,
            field_type: decl.field_type,
            source,
        })
    }

    /// Typed values of this field for one document
    pub fn values<'a>(&'a self, doc: &MappedDocument) -> FieldValues<'a> {
        FieldValues {
            field: self,
            raw: raw_values(&self.source, doc).into_iter(),
        }
    }
}

fn raw_values(source: &ValueSource, doc: &MappedDocument) -> Vec<String> {
    let counters = &doc.counters;
    match source {
        ValueSource::Uri => vec![doc.uri.clone()],
        ValueSource::Document => vec![doc.source.clone()],
        ValueSource::PathOccurrences => counters
            .path_occurrences()
            .into_iter()
            .map(str::to_string)
            .collect(),
        ValueSource::ElementNames => PathCounters::sorted_names(&counters.element_names)
            .into_iter()
            .map(str::to_string)
            .collect(),
        ValueSource::AttributeNames => PathCounters::sorted_names(&counters.attribute_names)
            .into_iter()
            .map(str::to_string)
            .collect(),
        ValueSource::ElementText => qualified(&counters.element_text),
        ValueSource::AttributeText => qualified(&counters.attribute_text),
        ValueSource::FullText => vec![words(&counters.text)],
        ValueSource::PathValues => counters
            .path_values
            .iter()
            .map(|(path, value)| format!("{path} {}", words(value)))
            .collect(),
        ValueSource::Element(name) => named(&counters.element_text, name),
        ValueSource::Attribute(name) => named(&counters.attribute_text, name),
    }
}

/// Joins a name and its text in element and attribute text terms. No QName
/// contains it, so a term splits back into exactly one name and value.
pub const TEXT_SEPARATOR: char = '=';

/// The character right after [`TEXT_SEPARATOR`]: `name>` bounds every
/// `name=...` term from above and nothing with a longer name falls between.
pub const TEXT_UPPER_BOUND: char = '>';

/// Term for `value` as the text of the element or attribute `name`
pub fn text_term(name: &str, value: &str) -> String {
    format!("{name}{TEXT_SEPARATOR}{value}")
}

fn qualified(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .map(|(name, value)| text_term(name, value))
        .collect()
}

fn named(pairs: &[(String, String)], name: &QName) -> Vec<String> {
    let wanted = name.to_string();
    pairs
        .iter()
        .filter(|(n, _)| *n == wanted)
        .map(|(_, value)| value.clone())
        .collect()
}

/// Lower-cased words separated by single spaces
pub fn words(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A typed field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Bytes(Vec<u8>),
    Tokens(Vec<String>),
}

impl FieldValue {
    /// The single index term for scalar values
    pub fn term(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Bytes(_) | FieldValue::Tokens(_) => None,
        }
    }

    /// Sort order: integers numerically, everything else by text
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            FieldValue::Tokens(tokens) => f.write_str(&tokens.join(" ")),
        }
    }
}

/// Iterator converting raw extracted strings to the field's type
pub struct FieldValues<'a> {
    field: &'a FieldDefinition,
    raw: std::vec::IntoIter<String>,
}

impl Iterator for FieldValues<'_> {
    type Item = FieldValue;

    fn next(&mut self) -> Option<FieldValue> {
        loop {
            let raw = self.raw.next()?;
            return Some(match self.field.field_type {
                FieldType::String => FieldValue::String(raw),
                FieldType::Bytes => FieldValue::Bytes(raw.into_bytes()),
                FieldType::Tokens => {
                    FieldValue::Tokens(raw.split_whitespace().map(str::to_string).collect())
                }
                FieldType::Int => match raw.trim().parse() {
                    Ok(value) => FieldValue::Int(value),
                    Err(_) => {
                        trace!(field = %self.field.name, value = %raw, "skipping non-integer value");
                        continue;
                    }
                },
            });
        }
    }
}
