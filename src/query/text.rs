use super::node::{BooleanQuery, ParseableQuery, RangeQuery, SpanNearQuery};
use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

/// Characters with a meaning in the textual grammar
static SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\+\-!():^\[\]"{}~*?|&/,=\s]"#).expect("valid escape pattern"));

/// Backslash-escape grammar characters in a term value
pub fn escape_value(value: &str) -> Cow<'_, str> {
    if value.is_empty() {
        return Cow::Borrowed("\"\"");
    }
    SPECIAL_CHARS.replace_all(value, r"\$0")
}

impl ParseableQuery {
    /// Textual form, parseable by [`crate::query::parse_query`]
    pub fn to_query_string(&self) -> String {
        self.to_string()
    }
}

fn write_range(f: &mut fmt::Formatter<'_>, range: &RangeQuery) -> fmt::Result {
    let open = if range.include_lower { '[' } else { '{' };
    let close = if range.include_upper { ']' } else { '}' };
    let lower = range.lower.as_deref().map_or(Cow::Borrowed("*"), escape_value);
    let upper = range.upper.as_deref().map_or(Cow::Borrowed("*"), escape_value);
    write!(f, "{}:{open}{lower} TO {upper}{close}", range.field)
}

fn write_boolean(f: &mut fmt::Formatter<'_>, query: &BooleanQuery) -> fmt::Result {
    let separator = format!(" {} ", query.occur().keyword());
    for (i, clause) in query.clauses().iter().enumerate() {
        if i > 0 {
            f.write_str(&separator)?;
        }
        match clause {
            ParseableQuery::Boolean(inner) if inner.occur() != query.occur() => {
                write!(f, "({clause})")?
            }
            _ => write!(f, "{clause}")?,
        }
    }
    Ok(())
}

fn write_span(f: &mut fmt::Formatter<'_>, span: &SpanNearQuery) -> fmt::Result {
    f.write_str("SpanNear(")?;
    for (i, clause) in span.clauses().iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{clause}")?;
    }
    f.write_str(")")?;
    if span.in_order() {
        f.write_str(" inOrder=true")?;
    }
    if span.slop() > 0 {
        write!(f, " slop={}", span.slop())?;
    }
    Ok(())
}

impl fmt::Display for ParseableQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseableQuery::Term(term) => write!(f, "{}:{}", term.field, escape_value(&term.value)),
            ParseableQuery::Range(range) => write_range(f, range),
            ParseableQuery::Boolean(query) => write_boolean(f, query),
            ParseableQuery::SpanNear(span) => write_span(f, span),
            ParseableQuery::MatchAll => f.write_str("*:*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("title"), "title");
        assert_eq!(escape_value("{}"), r"\{\}");
        assert_eq!(escape_value("title:Hello World"), r"title\:Hello\ World");
        assert_eq!(escape_value(""), "\"\"");
    }

    #[test]
    fn test_boolean_text() {
        let q = ParseableQuery::and([
            ParseableQuery::term("f", "a"),
            ParseableQuery::or([ParseableQuery::term("f", "b"), ParseableQuery::term("f", "c")]),
        ]);
        assert_eq!(q.to_query_string(), "f:a AND (f:b OR f:c)");
    }

    #[test]
    fn test_span_text() {
        let q = ParseableQuery::span_near(
            0,
            true,
            [
                ParseableQuery::term("px_path", "{}"),
                ParseableQuery::term("px_path", "a"),
                ParseableQuery::term("px_path", "b"),
            ],
        );
        assert_eq!(
            q.to_query_string(),
            r"SpanNear(px_path:\{\},px_path:a,px_path:b) inOrder=true"
        );

        let sloppy = ParseableQuery::span_near(
            255,
            true,
            [ParseableQuery::term("px_path", "a"), ParseableQuery::term("px_path", "b")],
        );
        assert_eq!(
            sloppy.to_query_string(),
            "SpanNear(px_path:a,px_path:b) inOrder=true slop=255"
        );
    }

    #[test]
    fn test_range_text() {
        let q = ParseableQuery::range("px_elt_text", Some("title:".into()), Some("title:m".into()), true, false);
        assert_eq!(q.to_query_string(), r"px_elt_text:[title\: TO title\:m}");

        let open = ParseableQuery::range("year", None, Some("2000".into()), false, true);
        assert_eq!(open.to_query_string(), "year:{* TO 2000]");
        assert_eq!(ParseableQuery::MatchAll.to_query_string(), "*:*");
    }
}
