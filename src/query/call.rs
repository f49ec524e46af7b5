//! Search extension calls embedded in rewritten trees.

use super::error::QueryError;
use super::node::ParseableQuery;
use super::parser::parse_query;
use crate::xpath::{Expr, Literal, QName};
use std::fmt;

pub const SEARCH_PREFIX: &str = "px";
pub const SEARCH_NAMESPACE: &str = "http://pathix.dev/ns/search";

/// Functions of the search extension surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFunction {
    Search,
    Count,
    Exists,
    FieldValues,
    FieldTerms,
}

impl SearchFunction {
    pub fn local_name(self) -> &'static str {
        match self {
            SearchFunction::Search => "search",
            SearchFunction::Count => "count",
            SearchFunction::Exists => "exists",
            SearchFunction::FieldValues => "field-values",
            SearchFunction::FieldTerms => "field-terms",
        }
    }

    pub fn qname(self) -> QName {
        QName::prefixed(SEARCH_PREFIX, self.local_name())
    }

    pub fn from_qname(name: &QName) -> Option<Self> {
        if name.prefix.as_deref() != Some(SEARCH_PREFIX) {
            return None;
        }
        match name.local.as_str() {
            "search" => Some(SearchFunction::Search),
            "count" => Some(SearchFunction::Count),
            "exists" => Some(SearchFunction::Exists),
            "field-values" => Some(SearchFunction::FieldValues),
            "field-terms" => Some(SearchFunction::FieldTerms),
            _ => None,
        }
    }

    pub fn call(self, args: Vec<Expr>) -> Expr {
        Expr::FunCall {
            name: self.qname(),
            args,
        }
    }
}

/// One key of a search sort specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
    pub empty_greatest: bool,
}

impl SortField {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
            empty_greatest: false,
        }
    }

    /// Parse `"f [ascending|descending] [empty least|empty greatest], ..."`
    pub fn parse_spec(spec: &str) -> Result<Vec<SortField>, QueryError> {
        let invalid = || QueryError::InvalidValue {
            what: "sort specification",
            value: spec.to_string(),
        };
        let mut fields = Vec::new();
        for part in spec.split(',') {
            let mut words = part.split_whitespace();
            let Some(field) = words.next() else {
                return Err(invalid());
            };
            let mut key = SortField::ascending(field);
            while let Some(word) = words.next() {
                match word {
                    "ascending" => key.descending = false,
                    "descending" => key.descending = true,
                    "empty" => match words.next() {
                        Some("least") => key.empty_greatest = false,
                        Some("greatest") => key.empty_greatest = true,
                        _ => return Err(invalid()),
                    },
                    _ => return Err(invalid()),
                }
            }
            fields.push(key);
        }
        Ok(fields)
    }

    pub fn spec(fields: &[SortField]) -> String {
        fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field)?;
        if self.descending {
            f.write_str(" descending")?;
        }
        if self.empty_greatest {
            f.write_str(" empty greatest")?;
        }
        Ok(())
    }
}

/// Paging bounds; `start` is 1-based like `subsequence`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start: usize,
    pub length: Option<usize>,
}

impl Page {
    pub fn new(start: usize, length: Option<usize>) -> Self {
        Self { start, length }
    }

    /// Paging for `subsequence(x, start, length)` with integer bounds.
    /// `None` when the window selects nothing.
    pub fn from_subsequence(start: i64, length: Option<i64>) -> Option<Self> {
        let first = start.max(1);
        match length {
            None => Some(Page::new(usize::try_from(first).ok()?, None)),
            Some(length) => {
                let end = start.checked_add(length)?;
                if end <= first {
                    return None;
                }
                Some(Page::new(
                    usize::try_from(first).ok()?,
                    Some(usize::try_from(end - first).ok()?),
                ))
            }
        }
    }

    /// Apply to a result list
    pub fn slice<T>(&self, items: &[T]) -> std::ops::Range<usize> {
        let start = self.start.saturating_sub(1).min(items.len());
        let end = match self.length {
            Some(length) => start.saturating_add(length).min(items.len()),
            None => items.len(),
        };
        start..end
    }
}

/// `px:search(query, fields, sort, start, length)`
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub query: ParseableQuery,
    pub fields: Vec<String>,
    pub sort: Vec<SortField>,
    pub page: Option<Page>,
}

impl SearchCall {
    pub fn new(query: ParseableQuery) -> Self {
        Self {
            query,
            fields: Vec::new(),
            sort: Vec::new(),
            page: None,
        }
    }

    /// Encode as a function call. Trailing absent arguments are dropped and
    /// interior ones become `()`.
    pub fn to_expr(&self) -> Expr {
        let mut args: Vec<Option<Expr>> = vec![Some(self.query.to_xml_node())];
        args.push((!self.fields.is_empty()).then(|| {
            Expr::Sequence(self.fields.iter().map(Expr::string).collect())
        }));
        args.push((!self.sort.is_empty()).then(|| Expr::string(SortField::spec(&self.sort))));
        if let Some(page) = self.page {
            args.push(Some(Expr::integer(page.start as i64)));
            args.push(page.length.map(|length| Expr::integer(length as i64)));
        }
        while matches!(args.last(), Some(None)) {
            args.pop();
        }
        SearchFunction::Search.call(args.into_iter().map(Option::unwrap_or_default).collect())
    }

    /// Decode a `px:search` call. `Ok(None)` when `expr` is some other expression.
    pub fn from_expr(expr: &Expr) -> Result<Option<Self>, QueryError> {
        let Expr::FunCall { name, args } = expr else {
            return Ok(None);
        };
        if SearchFunction::from_qname(name) != Some(SearchFunction::Search) {
            return Ok(None);
        }
        if args.is_empty() || args.len() > 5 {
            return Err(QueryError::MalformedCall(format!("{} arguments", args.len())));
        }
        let mut call = SearchCall::new(decode_query(&args[0])?);

        if let Some(fields) = args.get(1) {
            call.fields = match fields {
                Expr::Sequence(items) => items
                    .iter()
                    .map(string_literal)
                    .collect::<Result<Vec<_>, _>>()?,
                single => vec![string_literal(single)?],
            };
        }
        if let Some(sort) = args.get(2).filter(|e| !e.is_empty_sequence()) {
            call.sort = SortField::parse_spec(&string_literal(sort)?)?;
        }
        if let Some(start) = args.get(3).filter(|e| !e.is_empty_sequence()) {
            let length = match args.get(4) {
                Some(length) => Some(count_literal(length)?),
                None => None,
            };
            call.page = Some(Page::new(count_literal(start)?, length));
        }
        Ok(Some(call))
    }
}

/// Decode a predicate argument in structural or textual form
pub fn decode_query(expr: &Expr) -> Result<ParseableQuery, QueryError> {
    match expr {
        Expr::Literal(Literal::String(text)) => Ok(parse_query(text)?),
        other => ParseableQuery::from_xml_node(other),
    }
}

fn string_literal(expr: &Expr) -> Result<String, QueryError> {
    match expr {
        Expr::Literal(Literal::String(s)) => Ok(s.clone()),
        other => Err(QueryError::MalformedCall(format!("expected a string, got {other}"))),
    }
}

fn count_literal(expr: &Expr) -> Result<usize, QueryError> {
    match expr {
        Expr::Literal(Literal::Integer(i)) if *i >= 0 => Ok(*i as usize),
        other => Err(QueryError::MalformedCall(format!("expected a count, got {other}"))),
    }
}
