//! Reference in-memory search backend.
//!
//! Postings are roaring bitmaps per term; token fields also keep per-document
//! positions so that span predicates can be checked. Consecutive values of a
//! token field are separated by a position gap wider than any span slop the
//! optimizer emits, so a span never matches across two path occurrences.

use super::config::{FieldRole, FieldType};
use super::error::IndexError;
use super::field::FieldValue;
use super::mapper::map_document;
use super::schema::IndexSchema;
use crate::query::call::{Page, SearchCall, SearchFunction, SortField, decode_query};
use crate::query::{Occur, ParseableQuery, QueryError, RangeQuery, SpanNearQuery};
use crate::xpath::{Expr, Literal};
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

pub type DocId = u32;

/// Half-open token span `[start, end)`
type Span = (u32, u32);

/// Search extension surface
pub trait SearchBackend {
    /// Matching documents, sorted and paged
    fn search(
        &self,
        query: &ParseableQuery,
        sort: &[SortField],
        page: Option<Page>,
    ) -> Result<Vec<DocId>, IndexError>;

    fn count(&self, query: &ParseableQuery) -> Result<u64, IndexError>;

    fn exists(&self, query: &ParseableQuery) -> Result<bool, IndexError>;

    /// Stored values of a field for one document
    fn field_values(&self, field: &str, doc: DocId) -> Result<Vec<FieldValue>, IndexError>;

    /// Sorted distinct terms of a field, starting at `start`
    fn field_terms(&self, field: Option<&str>, start: Option<&str>) -> Result<Vec<String>, IndexError>;
}

/// Result of evaluating a search extension call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult {
    Documents(Vec<DocId>),
    Count(u64),
    Exists(bool),
    Terms(Vec<String>),
}

#[derive(Debug, Default)]
struct Postings {
    docs: RoaringBitmap,
    positions: FxHashMap<DocId, Vec<u32>>,
}

impl Postings {
    fn add(&mut self, doc: DocId, position: u32) {
        self.docs.insert(doc);
        self.positions.entry(doc).or_default().push(position);
    }
}

#[derive(Debug)]
struct StoredDocument {
    uri: String,
    values: FxHashMap<String, Vec<FieldValue>>,
}

#[derive(Debug)]
pub struct MemoryIndex {
    schema: Arc<IndexSchema>,
    documents: Vec<StoredDocument>,
    terms: FxHashMap<String, BTreeMap<String, Postings>>,
    all: RoaringBitmap,
}

impl MemoryIndex {
    pub fn new(schema: Arc<IndexSchema>) -> Self {
        Self {
            schema,
            documents: Vec::new(),
            terms: FxHashMap::default(),
            all: RoaringBitmap::new(),
        }
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn uri(&self, doc: DocId) -> Option<&str> {
        self.documents.get(doc as usize).map(|d| d.uri.as_str())
    }

    /// Extract and index one XML document
    pub fn add_document(&mut self, uri: &str, xml: &str) -> Result<DocId, IndexError> {
        let mapped = map_document(uri, xml)?;
        let id = self.documents.len() as DocId;
        let gap = self.schema.max_path_depth() + 2;

        let mut stored = FxHashMap::default();
        for field in self.schema.fields() {
            let postings = self.terms.entry(field.name.clone()).or_default();
            let mut position = 0u32;
            let mut values = Vec::new();
            for value in field.values(&mapped) {
                match &value {
                    FieldValue::Tokens(tokens) => {
                        for token in tokens {
                            postings.entry(token.clone()).or_default().add(id, position);
                            position += 1;
                        }
                        position += gap;
                    }
                    FieldValue::Bytes(_) => {}
                    scalar => {
                        if let Some(term) = scalar.term() {
                            postings.entry(term).or_default().add(id, position);
                            position += 1;
                        }
                    }
                }
                values.push(value);
            }
            stored.insert(field.name.clone(), values);
        }

        self.all.insert(id);
        self.documents.push(StoredDocument {
            uri: uri.to_string(),
            values: stored,
        });
        debug!(uri, id, "indexed document");
        Ok(id)
    }

    /// Documents matching a predicate, as a bitmap
    pub fn matching(&self, query: &ParseableQuery) -> Result<RoaringBitmap, IndexError> {
        match query {
            ParseableQuery::MatchAll => Ok(self.all.clone()),
            ParseableQuery::Term(term) => Ok(self
                .postings(&term.field)?
                .get(&term.value)
                .map(|p| p.docs.clone())
                .unwrap_or_default()),
            ParseableQuery::Range(range) => self.range_docs(range),
            ParseableQuery::Boolean(boolean) => {
                let mut clauses = boolean.clauses().iter();
                let mut docs = match clauses.next() {
                    Some(first) => self.matching(first)?,
                    None => return Ok(self.all.clone()),
                };
                for clause in clauses {
                    let other = self.matching(clause)?;
                    match boolean.occur() {
                        Occur::Must => docs &= other,
                        Occur::Should => docs |= other,
                    }
                }
                Ok(docs)
            }
            ParseableQuery::SpanNear(span) => {
                let mut candidates = self.all.clone();
                for clause in span.clauses() {
                    candidates &= self.matching(clause)?;
                }
                let mut docs = RoaringBitmap::new();
                for doc in candidates {
                    if !self.span_matches(span, doc)?.is_empty() {
                        docs.insert(doc);
                    }
                }
                Ok(docs)
            }
        }
    }

    fn postings(&self, field: &str) -> Result<&BTreeMap<String, Postings>, IndexError> {
        self.terms
            .get(field)
            .ok_or_else(|| IndexError::UnknownField(field.to_string()))
    }

    fn range_docs(&self, range: &RangeQuery) -> Result<RoaringBitmap, IndexError> {
        let postings = self.postings(&range.field)?;
        let numeric = self
            .schema
            .field(&range.field)
            .is_some_and(|f| f.field_type == FieldType::Int);
        let mut docs = RoaringBitmap::new();

        if numeric {
            let parse = |bound: &Option<String>| -> Result<Option<i64>, IndexError> {
                bound
                    .as_deref()
                    .map(|b| b.parse::<i64>())
                    .transpose()
                    .map_err(|_| {
                        QueryError::InvalidValue {
                            what: "integer range bound",
                            value: bound.clone().unwrap_or_default(),
                        }
                        .into()
                    })
            };
            let (lower, upper) = (parse(&range.lower)?, parse(&range.upper)?);
            for (term, posting) in postings {
                let Ok(value) = term.parse::<i64>() else { continue };
                let above = lower.is_none_or(|l| value > l || (range.include_lower && value == l));
                let below = upper.is_none_or(|u| value < u || (range.include_upper && value == u));
                if above && below {
                    docs |= &posting.docs;
                }
            }
            return Ok(docs);
        }

        let lower = match &range.lower {
            Some(l) if range.include_lower => Bound::Included(l.as_str()),
            Some(l) => Bound::Excluded(l.as_str()),
            None => Bound::Unbounded,
        };
        let upper = match &range.upper {
            Some(u) if range.include_upper => Bound::Included(u.as_str()),
            Some(u) => Bound::Excluded(u.as_str()),
            None => Bound::Unbounded,
        };
        if let (Some(l), Some(u)) = (&range.lower, &range.upper) {
            // BTreeMap::range rejects inverted or empty-exclusive bounds
            if l > u || (l == u && !(range.include_lower && range.include_upper)) {
                return Ok(docs);
            }
        }
        for (_, posting) in postings.range::<str, _>((lower, upper)) {
            docs |= &posting.docs;
        }
        Ok(docs)
    }

    fn positions(&self, field: &str, term: &str, doc: DocId) -> Result<Vec<Span>, IndexError> {
        Ok(self
            .postings(field)?
            .get(term)
            .and_then(|p| p.positions.get(&doc))
            .map(|positions| positions.iter().map(|&p| (p, p + 1)).collect())
            .unwrap_or_default())
    }

    /// All spans of `query` in one document, sorted by start
    fn spans(&self, query: &ParseableQuery, doc: DocId) -> Result<Vec<Span>, IndexError> {
        let mut spans = match query {
            ParseableQuery::Term(term) => self.positions(&term.field, &term.value, doc)?,
            ParseableQuery::Boolean(boolean) if boolean.occur() == Occur::Should => {
                let mut all = Vec::new();
                for clause in boolean.clauses() {
                    all.extend(self.spans(clause, doc)?);
                }
                all
            }
            ParseableQuery::SpanNear(span) => self.span_matches(span, doc)?,
            other => return Err(IndexError::UnsupportedSpan(other.to_string())),
        };
        spans.sort_unstable();
        spans.dedup();
        Ok(spans)
    }

    fn span_matches(&self, span: &SpanNearQuery, doc: DocId) -> Result<Vec<Span>, IndexError> {
        let lists = span
            .clauses()
            .iter()
            .map(|clause| self.spans(clause, doc))
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::new();
        if lists.iter().any(Vec::is_empty) {
            return Ok(out);
        }
        if span.in_order() {
            for &(start, end) in &lists[0] {
                extend_ordered(&lists, 1, start, end, 0, span.slop(), &mut out);
            }
        } else {
            let mut chosen = Vec::with_capacity(lists.len());
            choose_unordered(&lists, &mut chosen, span.slop(), &mut out);
        }
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    fn first_value(&self, doc: DocId, field: &str) -> Option<&FieldValue> {
        self.documents
            .get(doc as usize)
            .and_then(|d| d.values.get(field))
            .and_then(|values| values.first())
    }

    fn compare(&self, a: DocId, b: DocId, sort: &[SortField]) -> Ordering {
        for key in sort {
            let ordering = match (self.first_value(a, &key.field), self.first_value(b, &key.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) if key.empty_greatest => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) if key.empty_greatest => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.sort_cmp(y),
            };
            let ordering = if key.descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Evaluate a `px:search`, `px:count`, `px:exists` or `px:field-terms` call
    pub fn evaluate(&self, expr: &Expr) -> Result<CallResult, IndexError> {
        let not_a_call = || IndexError::NotSearchCall(expr.to_string());
        let Expr::FunCall { name, args } = expr else {
            return Err(not_a_call());
        };
        match SearchFunction::from_qname(name) {
            Some(SearchFunction::Search) => {
                let call = SearchCall::from_expr(expr)?.ok_or_else(not_a_call)?;
                Ok(CallResult::Documents(self.search(&call.query, &call.sort, call.page)?))
            }
            Some(SearchFunction::Count) => {
                let query = decode_query(args.first().ok_or_else(not_a_call)?)?;
                Ok(CallResult::Count(self.count(&query)?))
            }
            Some(SearchFunction::Exists) => {
                let query = decode_query(args.first().ok_or_else(not_a_call)?)?;
                Ok(CallResult::Exists(self.exists(&query)?))
            }
            Some(SearchFunction::FieldTerms) => {
                let text = |i: usize| match args.get(i) {
                    Some(Expr::Literal(Literal::String(s))) => Some(s.as_str()),
                    _ => None,
                };
                Ok(CallResult::Terms(self.field_terms(text(0), text(1))?))
            }
            Some(SearchFunction::FieldValues) | None => Err(not_a_call()),
        }
    }
}

fn extend_ordered(
    lists: &[Vec<Span>],
    index: usize,
    start: u32,
    end: u32,
    used: u32,
    slop: u32,
    out: &mut Vec<Span>,
) {
    if index == lists.len() {
        out.push((start, end));
        return;
    }
    for &(next_start, next_end) in &lists[index] {
        if next_start < end {
            continue;
        }
        let used = used + (next_start - end);
        if used > slop {
            // sorted by start: later spans only widen the gap
            break;
        }
        extend_ordered(lists, index + 1, start, next_end, used, slop, out);
    }
}

fn choose_unordered(lists: &[Vec<Span>], chosen: &mut Vec<Span>, slop: u32, out: &mut Vec<Span>) {
    if chosen.len() == lists.len() {
        let mut spans = chosen.clone();
        spans.sort_unstable();
        if spans.windows(2).any(|w| w[1].0 < w[0].1) {
            return;
        }
        let start = spans[0].0;
        let end = spans.iter().map(|s| s.1).max().unwrap_or(start);
        let covered: u32 = spans.iter().map(|s| s.1 - s.0).sum();
        if end - start - covered <= slop {
            out.push((start, end));
        }
        return;
    }
    for &span in &lists[chosen.len()] {
        chosen.push(span);
        choose_unordered(lists, chosen, slop, out);
        chosen.pop();
    }
}

impl SearchBackend for MemoryIndex {
    fn search(
        &self,
        query: &ParseableQuery,
        sort: &[SortField],
        page: Option<Page>,
    ) -> Result<Vec<DocId>, IndexError> {
        for key in sort {
            if self.schema.field(&key.field).is_none() {
                return Err(IndexError::UnknownField(key.field.clone()));
            }
        }
        let mut docs: Vec<DocId> = self.matching(query)?.into_iter().collect();
        if !sort.is_empty() {
            // stable: ties stay in document order
            docs.sort_by(|&a, &b| self.compare(a, b, sort));
        }
        if let Some(page) = page {
            let range = page.slice(&docs);
            docs = docs[range].to_vec();
        }
        Ok(docs)
    }

    fn count(&self, query: &ParseableQuery) -> Result<u64, IndexError> {
        Ok(self.matching(query)?.len())
    }

    fn exists(&self, query: &ParseableQuery) -> Result<bool, IndexError> {
        Ok(!self.matching(query)?.is_empty())
    }

    fn field_values(&self, field: &str, doc: DocId) -> Result<Vec<FieldValue>, IndexError> {
        if self.schema.field(field).is_none() {
            return Err(IndexError::UnknownField(field.to_string()));
        }
        Ok(self
            .documents
            .get(doc as usize)
            .and_then(|d| d.values.get(field))
            .cloned()
            .unwrap_or_default())
    }

    fn field_terms(&self, field: Option<&str>, start: Option<&str>) -> Result<Vec<String>, IndexError> {
        let field = match field {
            Some(field) => field,
            None => self.schema.require(FieldRole::FullText)?,
        };
        let postings = self.postings(field)?;
        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        Ok(postings
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(term, _)| term.clone())
            .collect())
    }
}
