use std::sync::LazyLock;
use regex::Regex;
use crate::core::error::{Error, Result};
use crate::query::ast::{ColumnRef, Constraint, Operand, Operator, ParsedQuery, Selection, SignedTerm, TableRef, Term};
use crate::schema::schema::SchemaRegistry;

// Quoted strings, two-char comparisons, single separators, numbers with a
// signed exponent, then runs of anything else. Splitting on the separators
// is what lets `time>=1` and `time >= 1` tokenize the same way.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"'[^']*'|"[^"]*"|<=|>=|!=|[=<>+\-(),]|"#,
        r#"(?:\d+\.?\d*|\.\d+)[eE][+\-]\d+\b|"#,
        r#"[^\s=<>+\-(),'"]+"#,
    ))
        .expect("token pattern compiles")
});

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern compiles")
});

const RESERVED: &[&str] = &["select", "distinct", "from", "where", "and", "between", "like", "in"];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Symbol(String),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self, Token::Symbol(s) if s == symbol)
    }

    fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Quoted(s) | Token::Symbol(s) => s,
        }
    }
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    if input.matches('\'').count() % 2 != 0 || input.matches('"').count() % 2 != 0 {
        return Err(Error::parse(format!("unterminated string in: {}", input)));
    }
    let tokens = TOKEN_RE
        .find_iter(input)
        .map(|m| {
            let s = m.as_str();
            if s.starts_with('\'') || s.starts_with('"') {
                Token::Quoted(s[1..s.len() - 1].to_string())
            } else if s.len() <= 2 && s.chars().all(|c| "=<>!+-(),".contains(c)) {
                Token::Symbol(s.to_string())
            } else {
                Token::Word(s.to_string())
            }
        })
        .collect();
    Ok(tokens)
}

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_symbol(symbol)) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            return Ok(());
        }
        Err(Error::parse(format!("expected '{}' but found {}", keyword, self.describe_next())))
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(token) => format!("'{}'", token.text()),
            None => "end of query".to_string(),
        }
    }
}

enum SelectItem {
    Star,
    TableStar(String),
    Column(ColumnRef),
}

/// Parser for the `select ... from ... where ...` subset.
pub struct QueryParser<'a> {
    pub registry: &'a SchemaRegistry,
    pub max_tables: usize,
}

impl<'a> QueryParser<'a> {
    pub fn new(registry: &'a SchemaRegistry, max_tables: usize) -> Self {
        QueryParser { registry, max_tables }
    }

    /// Parse a query string. Examples:
    /// - `select * from idc.origin where time >= 123.0 and time <= 456.0`
    /// - `select w.* from wfdisc w, affiliation a where a.net = 'IU' and w.sta = a.sta`
    /// - `select * from arrival where time between '2004/01/05' and '2004/01/06'`
    /// - `select * from site where sta like 'FIA%'`
    pub fn parse(&self, input: &str) -> Result<ParsedQuery> {
        let tokens = tokenize(input)?;
        match tokens.first() {
            None => return Err(Error::parse("empty query")),
            Some(Token::Symbol(s)) => {
                return Err(Error::parse(format!("query starts with '{}'", s)));
            }
            _ => {}
        }

        let mut ts = TokenStream { tokens, pos: 0 };
        ts.expect_keyword("select")?;
        let distinct = ts.eat_keyword("distinct");
        let selection = self.parse_selection(&mut ts)?;
        ts.expect_keyword("from")?;
        let mut tables = self.parse_tables(&mut ts)?;

        let mut constraints = Vec::new();
        if !ts.is_done() {
            if !ts.eat_keyword("where") {
                return Err(Error::parse(format!(
                    "expected 'where' after the table list but found {}",
                    ts.describe_next()
                )));
            }
            self.parse_constraints(&mut ts, &mut constraints)?;
        }

        promote_primary(&selection, &mut tables)?;

        Ok(ParsedQuery {
            text: input.trim().to_string(),
            distinct,
            selection,
            tables,
            constraints,
        })
    }

    fn parse_selection(&self, ts: &mut TokenStream) -> Result<Selection> {
        let mut items = Vec::new();
        loop {
            let item = match ts.next() {
                Some(Token::Word(w)) if w == "*" => SelectItem::Star,
                Some(Token::Word(w)) if !is_reserved(&w) => match w.strip_suffix(".*") {
                    Some(qualifier) => SelectItem::TableStar(qualifier.to_string()),
                    None => SelectItem::Column(split_column(&w)),
                },
                Some(other) => {
                    return Err(Error::parse(format!("unexpected '{}' in select list", other.text())));
                }
                None => return Err(Error::parse("select list is incomplete")),
            };
            items.push(item);
            if !ts.eat_symbol(",") {
                break;
            }
        }

        if items.len() == 1 {
            match items.pop() {
                Some(SelectItem::Star) => return Ok(Selection::All),
                Some(SelectItem::TableStar(q)) => return Ok(Selection::Table(q)),
                Some(SelectItem::Column(c)) => return Ok(Selection::Columns(vec![c])),
                None => {}
            }
        }
        let mut columns = Vec::with_capacity(items.len());
        for item in items {
            match item {
                SelectItem::Column(c) => columns.push(c),
                _ => return Err(Error::parse("'*' cannot be mixed with named columns")),
            }
        }
        Ok(Selection::Columns(columns))
    }

    fn parse_tables(&self, ts: &mut TokenStream) -> Result<Vec<TableRef>> {
        let mut tables = Vec::new();
        loop {
            let word = match ts.next() {
                Some(Token::Word(w)) if !is_reserved(&w) => w,
                _ => return Err(Error::parse("expected a table name after 'from'")),
            };
            let (author, table) = match word.split_once('.') {
                Some((author, table)) => (Some(author.to_string()), table.to_string()),
                None => (None, word),
            };
            if !self.registry.contains(&table) {
                return Err(Error::parse(format!("unknown table: {}", table)));
            }
            let alias = match ts.peek() {
                Some(Token::Word(w)) if !is_reserved(w) => {
                    let alias = w.clone();
                    ts.pos += 1;
                    Some(alias)
                }
                _ => None,
            };
            tables.push(TableRef { author, table, alias });
            if tables.len() > self.max_tables {
                return Err(Error::parse(format!(
                    "a query may name at most {} tables",
                    self.max_tables
                )));
            }
            if !ts.eat_symbol(",") {
                break;
            }
        }
        Ok(tables)
    }

    fn parse_constraints(&self, ts: &mut TokenStream, out: &mut Vec<Constraint>) -> Result<()> {
        loop {
            self.parse_constraint(ts, out)?;
            if ts.eat_keyword("and") {
                continue;
            }
            if ts.is_done() {
                return Ok(());
            }
            return Err(Error::parse(format!(
                "expected 'and' between constraints but found {}",
                ts.describe_next()
            )));
        }
    }

    fn parse_constraint(&self, ts: &mut TokenStream, out: &mut Vec<Constraint>) -> Result<()> {
        let left = parse_signed_term(ts)?;
        let op_token = ts.next().ok_or_else(|| Error::parse("constraint has no operator"))?;

        if op_token.is_keyword("between") {
            let low = parse_sum(ts)?;
            ts.expect_keyword("and")?;
            let high = parse_sum(ts)?;
            out.push(Constraint { op: Operator::Ge, left: left.clone(), right: Operand::Sum(low) });
            out.push(Constraint { op: Operator::Le, left, right: Operand::Sum(high) });
            return Ok(());
        }

        let op = match &op_token {
            Token::Quoted(_) => None,
            other => Operator::from_token(other.text()),
        }
        .ok_or_else(|| Error::parse(format!("unknown operator '{}'", op_token.text())))?;

        let right = match op {
            Operator::Like => match ts.next() {
                Some(Token::Quoted(p)) | Some(Token::Word(p)) => Operand::Pattern(p),
                _ => return Err(Error::parse("'like' needs a pattern")),
            },
            Operator::In => parse_list(ts)?,
            _ => Operand::Sum(parse_sum(ts)?),
        };

        out.push(normalize(Constraint { op, left, right }));
        Ok(())
    }
}

/// Put a lone column on the left: `5 < time` becomes `time > 5`.
fn normalize(constraint: Constraint) -> Constraint {
    let Constraint { op, left, right } = constraint;
    let left_is_constant = !matches!(left, Term::Column(_));
    match right {
        Operand::Sum(mut terms)
            if left_is_constant
                && terms.len() == 1
                && !terms[0].negative
                && matches!(terms[0].term, Term::Column(_)) =>
        {
            let column = terms.remove(0).term;
            Constraint {
                op: op.flipped(),
                left: column,
                right: Operand::Sum(vec![SignedTerm { negative: false, term: left }]),
            }
        }
        right => Constraint { op, left, right },
    }
}

fn promote_primary(selection: &Selection, tables: &mut Vec<TableRef>) -> Result<()> {
    let named: Vec<&str> = match selection {
        Selection::All => Vec::new(),
        Selection::Table(q) => vec![q.as_str()],
        Selection::Columns(columns) => columns
            .iter()
            .filter_map(|c| c.qualifier.as_deref())
            .collect(),
    };
    let mut qualifiers: Vec<&str> = Vec::new();
    for q in named {
        if !qualifiers.iter().any(|seen| seen.eq_ignore_ascii_case(q)) {
            qualifiers.push(q);
        }
    }

    match qualifiers.as_slice() {
        [] => Ok(()),
        [q] => {
            let index = tables
                .iter()
                .position(|t| t.answers_to(q))
                .ok_or_else(|| Error::parse(format!("select list names unknown table '{}'", q)))?;
            let primary = tables.remove(index);
            tables.insert(0, primary);
            Ok(())
        }
        _ => Err(Error::parse(format!(
            "select list names more than one table: {}",
            qualifiers.join(", ")
        ))),
    }
}

fn split_column(word: &str) -> ColumnRef {
    match word.split_once('.') {
        Some((qualifier, column)) => ColumnRef {
            qualifier: Some(qualifier.to_string()),
            column: column.to_string(),
        },
        None => ColumnRef { qualifier: None, column: word.to_string() },
    }
}

fn parse_term(ts: &mut TokenStream) -> Result<Term> {
    match ts.next() {
        Some(Token::Quoted(s)) => Ok(Term::Text(s)),
        Some(Token::Word(w)) if !is_reserved(&w) => {
            let numeric = w.starts_with(|c: char| c.is_ascii_digit() || c == '.');
            if numeric {
                if let Ok(v) = w.parse::<f64>() {
                    return Ok(Term::Number(v));
                }
            }
            if IDENT_RE.is_match(&w) {
                Ok(Term::Column(split_column(&w)))
            } else {
                Ok(Term::Text(w))
            }
        }
        Some(other) => Err(Error::parse(format!("unexpected '{}' in constraint", other.text()))),
        None => Err(Error::parse("constraint is incomplete")),
    }
}

/// A term with an optional leading sign folded into numeric constants.
fn parse_signed_term(ts: &mut TokenStream) -> Result<Term> {
    if ts.eat_symbol("-") {
        return match parse_term(ts)? {
            Term::Number(v) => Ok(Term::Number(-v)),
            _ => Err(Error::parse("'-' must precede a number on the left of a constraint")),
        };
    }
    ts.eat_symbol("+");
    parse_term(ts)
}

fn parse_sum(ts: &mut TokenStream) -> Result<Vec<SignedTerm>> {
    let mut terms = Vec::new();
    let mut negative = if ts.eat_symbol("-") {
        true
    } else {
        ts.eat_symbol("+");
        false
    };
    loop {
        let term = parse_term(ts)
            .map_err(|e| Error::parse(format!("bad right-hand side: {}", e.context)))?;
        terms.push(SignedTerm { negative, term });
        if ts.eat_symbol("+") {
            negative = false;
        } else if ts.eat_symbol("-") {
            negative = true;
        } else {
            return Ok(terms);
        }
    }
}

fn parse_list(ts: &mut TokenStream) -> Result<Operand> {
    let mut values = Vec::new();
    match ts.next() {
        Some(Token::Symbol(s)) if s == "(" => loop {
            let negative = ts.eat_symbol("-");
            match ts.next() {
                Some(Token::Quoted(v)) | Some(Token::Word(v)) => {
                    values.push(if negative { format!("-{}", v) } else { v });
                }
                _ => return Err(Error::parse("bad value in 'in' list")),
            }
            if ts.eat_symbol(")") {
                break;
            }
            if !ts.eat_symbol(",") {
                return Err(Error::parse("'in' list is missing ',' or ')'"));
            }
        },
        Some(Token::Quoted(list)) => {
            values.extend(
                list.split(',')
                    .map(|v| v.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
                    .filter(|v| !v.is_empty()),
            );
        }
        Some(Token::Word(v)) if !is_reserved(&v) => values.push(v),
        _ => return Err(Error::parse("'in' needs a value list")),
    }
    if values.is_empty() {
        return Err(Error::parse("'in' list is empty"));
    }
    let integers = values.iter().filter_map(|v| v.parse::<i64>().ok()).collect();
    Ok(Operand::List { values, integers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn parse(q: &str) -> Result<ParsedQuery> {
        let registry = SchemaRegistry::builtin();
        QueryParser::new(&registry, 4).parse(q)
    }

    fn sum(v: f64) -> Operand {
        Operand::Sum(vec![SignedTerm { negative: false, term: Term::Number(v) }])
    }

    fn column(q: Option<&str>, c: &str) -> Term {
        Term::Column(ColumnRef { qualifier: q.map(String::from), column: c.to_string() })
    }

    #[test]
    fn parses_time_range_on_authored_table() {
        let q = parse("select * from idc.origin where time >= 123.0 and time <= 456.0").unwrap();
        assert_eq!(q.selection, Selection::All);
        assert!(!q.distinct);
        assert_eq!(q.tables, vec![TableRef {
            author: Some("idc".into()),
            table: "origin".into(),
            alias: None,
        }]);
        assert_eq!(q.constraints, vec![
            Constraint { op: Operator::Ge, left: column(None, "time"), right: sum(123.0) },
            Constraint { op: Operator::Le, left: column(None, "time"), right: sum(456.0) },
        ]);
    }

    #[test]
    fn signed_exponent_stays_one_number() {
        let q = parse("select * from origin where time >= 1e-3 and lat<2.5E+1-1").unwrap();
        assert_eq!(q.constraints[0].right, sum(0.001));
        assert_eq!(q.constraints[1].right, Operand::Sum(vec![
            SignedTerm { negative: false, term: Term::Number(25.0) },
            SignedTerm { negative: true, term: Term::Number(1.0) },
        ]));
    }

    #[test]
    fn tight_spacing_tokenizes_like_loose_spacing() {
        let a = parse("select * from origin where time>=1-2 and orid=3").unwrap();
        let b = parse("select * from origin where time >= 1 - 2 and orid = 3").unwrap();
        assert_eq!(a.constraints, b.constraints);
        assert_eq!(a.constraints[0].right, Operand::Sum(vec![
            SignedTerm { negative: false, term: Term::Number(1.0) },
            SignedTerm { negative: true, term: Term::Number(2.0) },
        ]));
    }

    #[test]
    fn between_desugars_into_two_constraints() {
        let q = parse("select * from arrival where time between 10 and 20").unwrap();
        assert_eq!(q.constraints.len(), 2);
        assert_eq!(q.constraints[0].op, Operator::Ge);
        assert_eq!(q.constraints[1].op, Operator::Le);
        assert_eq!(q.constraints[1].right, sum(20.0));
    }

    #[test]
    fn select_alias_promotes_primary() {
        let q = parse("select w.* from affiliation a, wfdisc w where a.net = 'IU' and w.sta = a.sta").unwrap();
        assert_eq!(q.tables[0].table, "wfdisc");
        assert_eq!(q.tables[1].table, "affiliation");
        assert_eq!(q.selection, Selection::Table("w".into()));
    }

    #[test]
    fn two_select_aliases_are_rejected() {
        let err = parse("select o.orid, a.arid from origin o, assoc a").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[test]
    fn like_and_in_operands() {
        let q = parse("select distinct * from site where sta like 'FIA%' and ondate in (1990001, 2000001)").unwrap();
        assert!(q.distinct);
        assert_eq!(q.constraints[0].right, Operand::Pattern("FIA%".into()));
        assert_eq!(q.constraints[1].right, Operand::List {
            values: vec!["1990001".into(), "2000001".into()],
            integers: vec![1990001, 2000001],
        });

        let q = parse("select * from site where sta in 'ANMO, FIA0'").unwrap();
        assert_eq!(q.constraints[0].right, Operand::List {
            values: vec!["ANMO".into(), "FIA0".into()],
            integers: vec![],
        });
    }

    #[test]
    fn constant_on_left_is_flipped() {
        let q = parse("select * from origin where 100 < time").unwrap();
        assert_eq!(q.constraints[0], Constraint {
            op: Operator::Gt,
            left: column(None, "time"),
            right: sum(100.0),
        });
    }

    #[test]
    fn malformed_queries_fail_to_parse() {
        for bad in [
            "",
            "   ",
            "= select",
            ", select * from origin",
            "select * from nosuchtable",
            "select * from origin time > 3",
            "select * from origin where time >",
            "select * from origin where sta = 'abc",
            "select * from origin o, arrival a, assoc s, site t, sitechan c",
            "select * from origin where time != 3",
        ] {
            let err = parse(bad).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Parse, "query {:?}", bad);
        }
    }

    #[test]
    fn time_literals_stay_text() {
        let q = parse("select * from origin where time >= 2004/01/05").unwrap();
        assert_eq!(q.constraints[0].right, Operand::Sum(vec![SignedTerm {
            negative: false,
            term: Term::Text("2004/01/05".into()),
        }]));
    }
}
