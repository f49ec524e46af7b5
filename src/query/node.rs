/// How a boolean combines its clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    /// AND
    Must,
    /// OR
    Should,
}

impl Occur {
    pub fn keyword(self) -> &'static str {
        match self {
            Occur::Must => "AND",
            Occur::Should => "OR",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Occur::Must => "must",
            Occur::Should => "should",
        }
    }
}

/// Single term in a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermQuery {
    pub field: String,
    pub value: String,
}

/// Term range in a field; `None` bounds are open
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeQuery {
    pub field: String,
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub include_lower: bool,
    pub include_upper: bool,
}

/// AND/OR over clauses. Built through [`ParseableQuery::boolean`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BooleanQuery {
    occur: Occur,
    clauses: Vec<ParseableQuery>,
}

impl BooleanQuery {
    pub fn occur(&self) -> Occur {
        self.occur
    }

    pub fn clauses(&self) -> &[ParseableQuery] {
        &self.clauses
    }
}

/// Ordered or unordered proximity over clauses. Built through
/// [`ParseableQuery::span_near`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanNearQuery {
    slop: u32,
    in_order: bool,
    clauses: Vec<ParseableQuery>,
}

impl SpanNearQuery {
    pub fn slop(&self) -> u32 {
        self.slop
    }

    pub fn in_order(&self) -> bool {
        self.in_order
    }

    pub fn clauses(&self) -> &[ParseableQuery] {
        &self.clauses
    }

    /// Zero-slop ordered spans are the ones that flatten into each other
    pub fn is_adjacent(&self) -> bool {
        self.slop == 0 && self.in_order
    }
}

/// Index search predicate.
///
/// Boolean and span nodes can only be built through the normalizing
/// constructors, so every value in circulation is already normalized:
/// adjacent spans are flat, match-all never sits inside a span or an AND,
/// and no boolean or span has a single clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseableQuery {
    Term(TermQuery),
    Range(RangeQuery),
    Boolean(BooleanQuery),
    SpanNear(SpanNearQuery),
    MatchAll,
}

impl ParseableQuery {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        ParseableQuery::Term(TermQuery {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn range(
        field: impl Into<String>,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        ParseableQuery::Range(RangeQuery {
            field: field.into(),
            lower,
            upper,
            include_lower,
            include_upper,
        })
    }

    pub fn and(clauses: impl IntoIterator<Item = ParseableQuery>) -> Self {
        Self::boolean(Occur::Must, clauses)
    }

    pub fn or(clauses: impl IntoIterator<Item = ParseableQuery>) -> Self {
        Self::boolean(Occur::Should, clauses)
    }

    /// Build a normalized boolean.
    ///
    /// Same-operator children are flattened and duplicates dropped. Match-all
    /// is the identity of AND and absorbs OR.
    pub fn boolean(occur: Occur, clauses: impl IntoIterator<Item = ParseableQuery>) -> Self {
        let mut flat: Vec<ParseableQuery> = Vec::new();
        for clause in clauses {
            match clause {
                ParseableQuery::MatchAll => match occur {
                    Occur::Must => continue,
                    Occur::Should => return ParseableQuery::MatchAll,
                },
                ParseableQuery::Boolean(inner) if inner.occur == occur => {
                    for child in inner.clauses {
                        if !flat.contains(&child) {
                            flat.push(child);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => ParseableQuery::MatchAll,
            1 => flat.remove(0),
            _ => ParseableQuery::Boolean(BooleanQuery {
                occur,
                clauses: flat,
            }),
        }
    }

    /// Build a normalized span.
    ///
    /// A (0, in-order) span absorbs the clauses of (0, in-order) children; spans
    /// with any other parameters are kept nested.
    pub fn span_near(
        slop: u32,
        in_order: bool,
        clauses: impl IntoIterator<Item = ParseableQuery>,
    ) -> Self {
        let adjacent = slop == 0 && in_order;
        let mut flat = Vec::new();
        for clause in clauses {
            match clause {
                ParseableQuery::MatchAll => {}
                ParseableQuery::SpanNear(inner) if adjacent && inner.is_adjacent() => {
                    flat.extend(inner.clauses)
                }
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => ParseableQuery::MatchAll,
            1 => flat.remove(0),
            _ => ParseableQuery::SpanNear(SpanNearQuery {
                slop,
                in_order,
                clauses: flat,
            }),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, ParseableQuery::MatchAll)
    }

    /// Rebuild through the constructors
    pub fn normalized(&self) -> Self {
        match self {
            ParseableQuery::Boolean(b) => {
                Self::boolean(b.occur, b.clauses.iter().map(Self::normalized))
            }
            ParseableQuery::SpanNear(s) => {
                Self::span_near(s.slop, s.in_order, s.clauses.iter().map(Self::normalized))
            }
            other => other.clone(),
        }
    }

    /// Number of term and range leaves
    pub fn leaf_count(&self) -> usize {
        match self {
            ParseableQuery::Term(_) | ParseableQuery::Range(_) => 1,
            ParseableQuery::Boolean(b) => b.clauses.iter().map(Self::leaf_count).sum(),
            ParseableQuery::SpanNear(s) => s.clauses.iter().map(Self::leaf_count).sum(),
            ParseableQuery::MatchAll => 0,
        }
    }

    /// Field names referenced anywhere in the predicate
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields.sort_unstable();
        fields.dedup();
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ParseableQuery::Term(t) => out.push(&t.field),
            ParseableQuery::Range(r) => out.push(&r.field),
            ParseableQuery::Boolean(b) => b.clauses.iter().for_each(|c| c.collect_fields(out)),
            ParseableQuery::SpanNear(s) => s.clauses.iter().for_each(|c| c.collect_fields(out)),
            ParseableQuery::MatchAll => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(v: &str) -> ParseableQuery {
        ParseableQuery::term("px_path", v)
    }

    #[test]
    fn test_adjacent_spans_flatten() {
        let inner = ParseableQuery::span_near(0, true, [t("{}"), t("a")]);
        let outer = ParseableQuery::span_near(0, true, [inner, t("b")]);
        let ParseableQuery::SpanNear(span) = &outer else {
            panic!("expected span");
        };
        assert_eq!(span.clauses(), &[t("{}"), t("a"), t("b")]);
    }

    #[test]
    fn test_sloppy_spans_stay_nested() {
        let sloppy = ParseableQuery::span_near(3, true, [t("a"), t("b")]);
        let outer = ParseableQuery::span_near(0, true, [sloppy.clone(), t("c")]);
        let ParseableQuery::SpanNear(span) = &outer else {
            panic!("expected span");
        };
        assert_eq!(span.clauses().len(), 2);
        assert_eq!(span.clauses()[0], sloppy);

        // a sloppy parent does not absorb an adjacent child either
        let adjacent = ParseableQuery::span_near(0, true, [t("a"), t("b")]);
        let parent = ParseableQuery::span_near(2, true, [adjacent.clone(), t("c")]);
        let ParseableQuery::SpanNear(span) = &parent else {
            panic!("expected span");
        };
        assert_eq!(span.clauses()[0], adjacent);
    }

    #[test]
    fn test_span_degenerate_cases() {
        assert_eq!(ParseableQuery::span_near(0, true, []), ParseableQuery::MatchAll);
        assert_eq!(ParseableQuery::span_near(5, true, [t("a")]), t("a"));
        assert_eq!(
            ParseableQuery::span_near(0, true, [ParseableQuery::MatchAll, t("a")]),
            t("a")
        );
    }

    #[test]
    fn test_boolean_normalization() {
        assert_eq!(ParseableQuery::and([ParseableQuery::MatchAll, t("a")]), t("a"));
        assert_eq!(ParseableQuery::or([ParseableQuery::MatchAll, t("a")]), ParseableQuery::MatchAll);
        assert_eq!(ParseableQuery::and([t("a"), t("a")]), t("a"));

        let nested = ParseableQuery::and([ParseableQuery::and([t("a"), t("b")]), t("c")]);
        let ParseableQuery::Boolean(b) = &nested else {
            panic!("expected boolean");
        };
        assert_eq!(b.occur(), Occur::Must);
        assert_eq!(b.clauses().len(), 3);

        let mixed = ParseableQuery::and([ParseableQuery::or([t("a"), t("b")]), t("c")]);
        let ParseableQuery::Boolean(b) = &mixed else {
            panic!("expected boolean");
        };
        assert_eq!(b.clauses().len(), 2);
    }

    #[test]
    fn test_normalized_is_stable() {
        let q = ParseableQuery::and([
            ParseableQuery::span_near(0, true, [t("{}"), t("a"), t("b")]),
            ParseableQuery::or([t("x"), t("y")]),
        ]);
        assert_eq!(q.normalized(), q);
        assert_eq!(q.leaf_count(), 5);
        assert_eq!(q.fields(), vec!["px_path"]);
    }
}
