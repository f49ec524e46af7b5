//! Structural form of predicates: element-constructor expressions that the
//! search extension functions decode at execution time.

use super::error::QueryError;
use super::node::{Occur, ParseableQuery};
use crate::xpath::{Expr, Literal, QName};

const TERM: &str = "TermQuery";
const RANGE: &str = "TermRangeQuery";
const BOOLEAN: &str = "BooleanQuery";
const CLAUSE: &str = "Clause";
const MATCH_ALL: &str = "MatchAllDocsQuery";
const SPAN_NEAR: &str = "SpanNear";
const SPAN_TERM: &str = "SpanTerm";
const SPAN_OR: &str = "SpanOr";

fn element(name: &str, attributes: Vec<Expr>, content: Vec<Expr>) -> Expr {
    let content = match content.len() {
        0 => None,
        1 => content.into_iter().next().map(Box::new),
        _ => Some(Box::new(Expr::Sequence(content))),
    };
    Expr::Element {
        name: QName::new(name),
        attributes,
        content,
    }
}

fn attribute(name: &str, value: Expr) -> Expr {
    Expr::Attribute {
        name: QName::new(name),
        value: Box::new(value),
    }
}

impl ParseableQuery {
    /// Element-constructor tree for this predicate
    pub fn to_xml_node(&self) -> Expr {
        self.xml_node(false)
    }

    fn xml_node(&self, in_span: bool) -> Expr {
        match self {
            ParseableQuery::Term(term) => element(
                if in_span { SPAN_TERM } else { TERM },
                vec![attribute("fieldName", Expr::string(&term.field))],
                vec![Expr::string(&term.value)],
            ),
            ParseableQuery::Range(range) => {
                let mut attributes = vec![attribute("fieldName", Expr::string(&range.field))];
                if let Some(lower) = &range.lower {
                    attributes.push(attribute("lowerTerm", Expr::string(lower)));
                }
                if let Some(upper) = &range.upper {
                    attributes.push(attribute("upperTerm", Expr::string(upper)));
                }
                attributes.push(attribute("includeLower", Expr::string(range.include_lower.to_string())));
                attributes.push(attribute("includeUpper", Expr::string(range.include_upper.to_string())));
                element(RANGE, attributes, vec![])
            }
            ParseableQuery::Boolean(query) if in_span && query.occur() == Occur::Should => element(
                SPAN_OR,
                vec![],
                query.clauses().iter().map(|c| c.xml_node(true)).collect(),
            ),
            ParseableQuery::Boolean(query) => {
                let clauses = query
                    .clauses()
                    .iter()
                    .map(|clause| {
                        element(
                            CLAUSE,
                            vec![attribute("occurs", Expr::string(query.occur().as_str()))],
                            vec![clause.xml_node(in_span)],
                        )
                    })
                    .collect();
                element(BOOLEAN, vec![], clauses)
            }
            ParseableQuery::SpanNear(span) => {
                let mut attributes = Vec::new();
                if span.in_order() {
                    attributes.push(attribute("inOrder", Expr::string("true")));
                }
                attributes.push(attribute("slop", Expr::integer(i64::from(span.slop()))));
                element(
                    SPAN_NEAR,
                    attributes,
                    span.clauses().iter().map(|c| c.xml_node(true)).collect(),
                )
            }
            ParseableQuery::MatchAll => element(MATCH_ALL, vec![], vec![]),
        }
    }

    /// Decode an element-constructor tree built by [`Self::to_xml_node`]
    pub fn from_xml_node(expr: &Expr) -> Result<Self, QueryError> {
        let node = XmlNode::new(expr)?;
        match node.name {
            TERM | SPAN_TERM => Ok(ParseableQuery::term(
                node.required("fieldName")?,
                node.text()?,
            )),
            RANGE => Ok(ParseableQuery::range(
                node.required("fieldName")?,
                node.attribute("lowerTerm")?,
                node.attribute("upperTerm")?,
                node.flag("includeLower")?,
                node.flag("includeUpper")?,
            )),
            BOOLEAN => {
                let mut occur = None;
                let mut clauses = Vec::new();
                for child in node.content() {
                    let clause = XmlNode::new(child)?;
                    if clause.name != CLAUSE {
                        return Err(QueryError::UnexpectedNode(clause.name.to_string()));
                    }
                    occur = Some(match clause.required("occurs")?.as_str() {
                        "must" => Occur::Must,
                        "should" => Occur::Should,
                        other => {
                            return Err(QueryError::InvalidValue {
                                what: "occurs",
                                value: other.to_string(),
                            })
                        }
                    });
                    let inner: Vec<&Expr> = clause.content().collect();
                    let [inner] = inner.as_slice() else {
                        return Err(QueryError::UnexpectedNode(format!(
                            "{CLAUSE} with {} children",
                            inner.len()
                        )));
                    };
                    clauses.push(Self::from_xml_node(inner)?);
                }
                Ok(ParseableQuery::boolean(occur.unwrap_or(Occur::Must), clauses))
            }
            SPAN_OR => Ok(ParseableQuery::or(
                node.content()
                    .map(Self::from_xml_node)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            SPAN_NEAR => {
                let slop = node.required("slop")?;
                let slop = slop.parse().map_err(|_| QueryError::InvalidValue {
                    what: "slop",
                    value: slop.clone(),
                })?;
                let in_order = node.flag("inOrder")?;
                let clauses = node
                    .content()
                    .map(Self::from_xml_node)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ParseableQuery::span_near(slop, in_order, clauses))
            }
            MATCH_ALL => Ok(ParseableQuery::MatchAll),
            other => Err(QueryError::UnexpectedNode(other.to_string())),
        }
    }
}

/// Borrowed view of an element constructor
struct XmlNode<'a> {
    name: &'a str,
    attributes: &'a [Expr],
    content: Option<&'a Expr>,
}

impl<'a> XmlNode<'a> {
    fn new(expr: &'a Expr) -> Result<Self, QueryError> {
        match expr {
            Expr::Element {
                name,
                attributes,
                content,
            } => Ok(Self {
                name: &name.local,
                attributes,
                content: content.as_deref(),
            }),
            other => Err(QueryError::UnexpectedNode(other.to_string())),
        }
    }

    fn content(&self) -> impl Iterator<Item = &'a Expr> {
        let items: &'a [Expr] = match self.content {
            Some(Expr::Sequence(items)) => items,
            Some(single) => std::slice::from_ref(single),
            None => &[],
        };
        items.iter()
    }

    fn text(&self) -> Result<String, QueryError> {
        let text = match self.content {
            None => Ok(String::new()),
            Some(Expr::Text(inner)) => literal_text(inner),
            Some(value) => literal_text(value),
        };
        text.map_err(|_| QueryError::UnexpectedNode(format!("{} content", self.name)))
    }

    fn attribute(&self, wanted: &str) -> Result<Option<String>, QueryError> {
        for attr in self.attributes {
            if let Expr::Attribute { name, value } = attr
                && name.local == wanted
            {
                return literal_text(value).map(Some);
            }
        }
        Ok(None)
    }

    fn required(&self, wanted: &str) -> Result<String, QueryError> {
        self.attribute(wanted)?.ok_or_else(|| QueryError::MissingAttribute {
            element: self.name.to_string(),
            attribute: wanted.to_string(),
        })
    }

    fn flag(&self, wanted: &str) -> Result<bool, QueryError> {
        match self.attribute(wanted)?.as_deref() {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(QueryError::InvalidValue {
                what: "boolean attribute",
                value: other.to_string(),
            }),
        }
    }
}

fn literal_text(expr: &Expr) -> Result<String, QueryError> {
    match expr {
        Expr::Literal(Literal::String(s)) => Ok(s.clone()),
        Expr::Literal(Literal::Integer(i)) => Ok(i.to_string()),
        Expr::Literal(Literal::Boolean(b)) => Ok(b.to_string()),
        other => Err(QueryError::UnexpectedNode(other.to_string())),
    }
}
