use super::error::QueryParseError;
use super::node::ParseableQuery;

/// Parse the textual predicate form produced by
/// [`ParseableQuery::to_query_string`]
pub fn parse_query(input: &str) -> Result<ParseableQuery, QueryParseError> {
    let mut parser = QueryParser::new(input);
    let query = parser.parse_or()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(query)
}

/// Query parser
/// Characters a field name may use in the textual form
pub fn is_field_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.')
}

struct QueryParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> QueryParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_or(&mut self) -> Result<ParseableQuery, QueryParseError> {
        let mut nodes = vec![self.parse_and()?];

        while self.consume_keyword("OR") {
            nodes.push(self.parse_and()?);
        }

        Ok(if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            ParseableQuery::or(nodes)
        })
    }

    fn parse_and(&mut self) -> Result<ParseableQuery, QueryParseError> {
        let mut nodes = vec![self.parse_primary()?];

        while self.consume_keyword("AND") {
            nodes.push(self.parse_primary()?);
        }

        Ok(if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            ParseableQuery::and(nodes)
        })
    }

    fn parse_primary(&mut self) -> Result<ParseableQuery, QueryParseError> {
        self.skip_whitespace();

        // Parenthesized group
        if self.consume_char('(') {
            let node = self.parse_or()?;
            self.skip_whitespace();
            self.expect_char(')')?;
            return Ok(node);
        }

        if self.remaining().starts_with("*:*") {
            self.pos += 3;
            return Ok(ParseableQuery::MatchAll);
        }

        if self.remaining().starts_with("SpanNear(") {
            self.pos += "SpanNear(".len();
            return self.parse_span();
        }

        self.parse_field_query()
    }

    fn parse_span(&mut self) -> Result<ParseableQuery, QueryParseError> {
        let mut clauses = vec![self.parse_or()?];
        self.skip_whitespace();
        while self.consume_char(',') {
            clauses.push(self.parse_or()?);
            self.skip_whitespace();
        }
        self.expect_char(')')?;

        let mut in_order = false;
        let mut slop = 0;
        loop {
            let save = self.pos;
            self.skip_whitespace();
            if let Some(rest) = self.remaining().strip_prefix("inOrder=") {
                self.pos = self.input.len() - rest.len();
                in_order = match self.read_word() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(self.error("expected true or false after inOrder=")),
                };
            } else if let Some(rest) = self.remaining().strip_prefix("slop=") {
                self.pos = self.input.len() - rest.len();
                let start = self.pos;
                slop = self
                    .read_word()
                    .parse()
                    .map_err(|_| QueryParseError::new(start, "expected an integer after slop="))?;
            } else {
                self.pos = save;
                break;
            }
        }

        Ok(ParseableQuery::span_near(slop, in_order, clauses))
    }

    fn parse_field_query(&mut self) -> Result<ParseableQuery, QueryParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if is_field_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        let field = &self.input[start..self.pos];
        if field.is_empty() {
            return Err(self.error("expected a field name"));
        }
        self.expect_char(':')?;

        match self.peek_char() {
            Some('[') | Some('{') => self.parse_range(field),
            Some('"') => {
                let value = self.parse_quoted()?;
                Ok(ParseableQuery::term(field, value))
            }
            _ => {
                let value = self.read_value(|ch| ch.is_whitespace() || ch == ')' || ch == ',')?;
                if value.is_empty() {
                    return Err(self.error("expected a term value"));
                }
                Ok(ParseableQuery::term(field, value))
            }
        }
    }

    fn parse_range(&mut self, field: &str) -> Result<ParseableQuery, QueryParseError> {
        let include_lower = self.peek_char() == Some('[');
        self.advance();

        let lower = self.read_bound(|ch| ch == ' ')?;
        if !self.remaining().starts_with(" TO ") {
            return Err(self.error("expected ' TO ' in range"));
        }
        self.pos += 4;
        let upper = self.read_bound(|ch| ch == ']' || ch == '}')?;

        let include_upper = match self.peek_char() {
            Some(']') => true,
            Some('}') => false,
            _ => return Err(self.error("unterminated range")),
        };
        self.advance();

        Ok(ParseableQuery::range(field, lower, upper, include_lower, include_upper))
    }

    /// Read a range bound; an unescaped `*` is an open bound
    fn read_bound(&mut self, stop: impl Fn(char) -> bool) -> Result<Option<String>, QueryParseError> {
        if self.remaining().starts_with('*') {
            let after = self.remaining()[1..].chars().next();
            if after.is_some_and(&stop) {
                self.advance();
                return Ok(None);
            }
        }
        if self.peek_char() == Some('"') {
            return self.parse_quoted().map(Some);
        }
        self.read_value(stop).map(Some)
    }

    /// Read up to an unescaped stop character, resolving backslash escapes
    fn read_value(&mut self, stop: impl Fn(char) -> bool) -> Result<String, QueryParseError> {
        let mut value = String::new();
        while let Some(ch) = self.peek_char() {
            if stop(ch) {
                break;
            }
            self.advance();
            if ch == '\\' {
                match self.peek_char() {
                    Some(escaped) => {
                        value.push(escaped);
                        self.advance();
                    }
                    None => return Err(self.error("dangling escape")),
                }
            } else {
                value.push(ch);
            }
        }
        Ok(value)
    }

    fn parse_quoted(&mut self) -> Result<String, QueryParseError> {
        self.expect_char('"')?;
        let value = self.read_value(|ch| ch == '"')?;
        self.expect_char('"')?;
        Ok(value)
    }

    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if !ch.is_alphanumeric() {
                break;
            }
            self.advance();
        }
        &self.input[start..self.pos]
    }

    /// Consume ` KEYWORD ` (surrounding whitespace required)
    fn consume_keyword(&mut self, keyword: &str) -> bool {
        let save = self.pos;
        self.skip_whitespace();
        if self.pos > save
            && let Some(rest) = self.remaining().strip_prefix(keyword)
            && rest.starts_with(char::is_whitespace)
        {
            self.pos = self.input.len() - rest.len();
            self.skip_whitespace();
            return true;
        }
        self.pos = save;
        false
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), QueryParseError> {
        if self.consume_char(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> QueryParseError {
        QueryParseError::new(self.pos, message)
    }
}
