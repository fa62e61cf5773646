//! Filter evaluation against the registered server set.
//!
//! The normalized filter is parsed once into a small boolean expression
//! tree and then evaluated per record through the attribute accessor
//! table. Evaluation fails open: a filter that cannot be parsed or
//! evaluated is logged and the full valid set is returned, because the
//! protocol has no way to report an error back to the client.

use log::warn;
use shared::{AttrValue, GameServerRecord};

/// Starts from the valid records and narrows them by `filter` when one is
/// present. Registry iteration order is preserved; no sort is imposed.
pub fn filter_servers(servers: Vec<GameServerRecord>, filter: &str) -> Vec<GameServerRecord> {
    let valid: Vec<GameServerRecord> = servers.into_iter().filter(|s| s.valid).collect();

    if filter.trim().is_empty() {
        return valid;
    }

    let expr = match parse_filter(filter) {
        Ok(expr) => expr,
        Err(e) => {
            warn!("Error parsing filter {:?}: {}", filter, e);
            return valid;
        }
    };

    let mut matched = Vec::new();
    for server in &valid {
        match expr.evaluate(server) {
            Ok(true) => matched.push(server.clone()),
            Ok(false) => {}
            Err(e) => {
                warn!("Error evaluating filter {:?}: {}", filter, e);
                return valid;
            }
        }
    }
    matched
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Attribute(String),
    Number(f64),
    Text(String),
}

/// A resolved operand value during evaluation.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    Text(String),
    Null,
}

impl Expr {
    pub fn evaluate(&self, record: &GameServerRecord) -> Result<bool, String> {
        match self {
            Expr::Or(left, right) => Ok(left.evaluate(record)? || right.evaluate(record)?),
            Expr::And(left, right) => Ok(left.evaluate(record)? && right.evaluate(record)?),
            Expr::Compare { left, op, right } => {
                let left = resolve(left, record)?;
                let right = resolve(right, record)?;
                Ok(compare(&left, *op, &right))
            }
            Expr::IsNull { operand, negated } => {
                let value = resolve(operand, record)?;
                let is_null = value == Value::Null;
                Ok(is_null != *negated)
            }
        }
    }
}

fn resolve(operand: &Operand, record: &GameServerRecord) -> Result<Value, String> {
    match operand {
        Operand::Number(n) => Ok(Value::Num(*n)),
        Operand::Text(s) => Ok(Value::Text(s.clone())),
        Operand::Attribute(name) => {
            let attr = record
                .attribute(name)
                .ok_or_else(|| format!("unknown attribute {:?}", name))?;
            Ok(match attr {
                AttrValue::Int(n) => Value::Num(n as f64),
                AttrValue::Bool(b) => Value::Num(if b { 1.0 } else { 0.0 }),
                AttrValue::Str(s) => Value::Text(s),
                AttrValue::Null => Value::Null,
            })
        }
    }
}

/// Comparisons against a value-less attribute are false; nullness is only
/// observable through `is null`.
fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
    if *left == Value::Null || *right == Value::Null {
        return false;
    }

    match op {
        CmpOp::Like => like_match(&render(right), &render(left)),
        CmpOp::NotLike => !like_match(&render(right), &render(left)),
        _ => {
            // Numeric when both sides read as numbers, lexical otherwise.
            let ordering = match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => Some(render(left).cmp(&render(right))),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CmpOp::Eq => ordering.is_eq(),
                CmpOp::Ne => ordering.is_ne(),
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                CmpOp::Like | CmpOp::NotLike => unreachable!(),
            }
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Num(n) => Some(*n),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Null => None,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Num(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Value::Text(s) => s.clone(),
        Value::Null => String::new(),
    }
}

/// SQL-style wildcard match: `%` any run, `_` any single character,
/// `[...]` a character class (`[[]` escapes a literal bracket, `[^...]`
/// negates, `a-z` ranges). Matching is case-insensitive.
///
/// The pattern is client-controlled, so matching runs the iterative
/// two-pointer algorithm and stays O(pattern * text) even for
/// wildcard-dense patterns; naive backtracking would let a hostile
/// filter pin a worker thread.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let elems = compile_pattern(&pattern.to_ascii_lowercase());
    let text: Vec<char> = text.to_ascii_lowercase().chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    // Where to resume after the most recent `%`, widening its run by one
    // character per retry.
    let mut resume: Option<(usize, usize)> = None;

    while ti < text.len() {
        match elems.get(pi) {
            Some(PatternElem::AnyRun) => {
                resume = Some((pi + 1, ti));
                pi += 1;
            }
            Some(elem) if elem.matches(text[ti]) => {
                pi += 1;
                ti += 1;
            }
            _ => match resume {
                Some((rp, rt)) => {
                    resume = Some((rp, rt + 1));
                    pi = rp;
                    ti = rt + 1;
                }
                None => return false,
            },
        }
    }

    while matches!(elems.get(pi), Some(PatternElem::AnyRun)) {
        pi += 1;
    }
    pi == elems.len()
}

/// One compiled unit of a `like` pattern.
enum PatternElem {
    AnyRun,
    AnyOne,
    Class(CharClass),
    Literal(char),
}

impl PatternElem {
    /// Whether this element consumes `c`. `AnyRun` never consumes here;
    /// its runs are grown by the matcher's resume bookkeeping.
    fn matches(&self, c: char) -> bool {
        match self {
            PatternElem::AnyRun => false,
            PatternElem::AnyOne => true,
            PatternElem::Class(class) => class.matches(c),
            PatternElem::Literal(l) => *l == c,
        }
    }
}

fn compile_pattern(pattern: &str) -> Vec<PatternElem> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut elems = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '%' => {
                elems.push(PatternElem::AnyRun);
                i += 1;
            }
            '_' => {
                elems.push(PatternElem::AnyOne);
                i += 1;
            }
            '[' => {
                if let Some((class, after)) = parse_class(&chars, i) {
                    elems.push(PatternElem::Class(class));
                    i = after;
                } else {
                    // Unterminated class, treat the bracket literally.
                    elems.push(PatternElem::Literal('['));
                    i += 1;
                }
            }
            c => {
                elems.push(PatternElem::Literal(c));
                i += 1;
            }
        }
    }

    elems
}

struct CharClass {
    ranges: Vec<(char, char)>,
    negated: bool,
}

impl CharClass {
    fn matches(&self, c: char) -> bool {
        let inside = self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
        inside != self.negated
    }
}

/// Parses a `[...]` class starting at `pi`, returning it with the index
/// just past the closing bracket.
fn parse_class(pattern: &[char], pi: usize) -> Option<(CharClass, usize)> {
    let mut j = pi + 1;
    let mut negated = false;
    if pattern.get(j) == Some(&'^') {
        negated = true;
        j += 1;
    }

    let mut ranges = Vec::new();
    while j < pattern.len() {
        let c = pattern[j];
        if c == ']' && !ranges.is_empty() {
            return Some((CharClass { ranges, negated }, j + 1));
        }
        if pattern.get(j + 1) == Some(&'-') && pattern.get(j + 2).map_or(false, |&e| e != ']') {
            ranges.push((c, pattern[j + 2]));
            j += 3;
        } else {
            ranges.push((c, c));
            j += 1;
        }
    }

    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
    Is,
    Null,
    Like,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err("lone '&'".to_string());
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err("lone '|'".to_string());
                }
            }
            '=' => {
                tokens.push(Token::Eq);
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err("lone '!'".to_string());
                }
            }
            '<' => match chars.get(i + 1) {
                Some(&'>') => {
                    tokens.push(Token::Ne);
                    i += 2;
                }
                Some(&'=') => {
                    tokens.push(Token::Le);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut j = i + 1;
                let mut text = String::new();
                while j < chars.len() && chars[j] != quote {
                    text.push(chars[j]);
                    j += 1;
                }
                // An unterminated literal runs to end of input; the
                // normalizer closes literals implicitly the same way.
                i = if j < chars.len() { j + 1 } else { j };
                tokens.push(Token::Str(text));
            }
            _ if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut j = i + 1;
                while j < chars.len()
                    && (chars[j].is_ascii_digit() || chars[j] == '.' || chars[j] == '-')
                {
                    j += 1;
                }
                let literal: String = chars[i..j].iter().collect();
                let number: f64 = literal
                    .parse()
                    .map_err(|_| format!("bad number {:?}", literal))?;
                tokens.push(Token::Number(number));
                i = j;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "is" => Token::Is,
                    "null" => Token::Null,
                    "like" => Token::Like,
                    _ => Token::Ident(word),
                });
                i = j;
            }
            _ => return Err(format!("unexpected character {:?}", c)),
        }
    }

    Ok(tokens)
}

/// Parses a normalized filter into an expression tree.
pub fn parse_filter(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing input at token {}", parser.pos));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.advance() {
            Some(found) if found == token => Ok(()),
            found => Err(format!("expected {:?}, found {:?}", token, found)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_term()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_term()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let expr = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(expr);
        }

        let left = self.parse_operand()?;
        match self.advance() {
            Some(Token::Eq) => self.finish_compare(left, CmpOp::Eq),
            Some(Token::Ne) => self.finish_compare(left, CmpOp::Ne),
            Some(Token::Lt) => self.finish_compare(left, CmpOp::Lt),
            Some(Token::Le) => self.finish_compare(left, CmpOp::Le),
            Some(Token::Gt) => self.finish_compare(left, CmpOp::Gt),
            Some(Token::Ge) => self.finish_compare(left, CmpOp::Ge),
            Some(Token::Like) => self.finish_compare(left, CmpOp::Like),
            Some(Token::Not) => {
                self.expect(Token::Like)?;
                self.finish_compare(left, CmpOp::NotLike)
            }
            Some(Token::Is) => {
                let negated = if self.peek() == Some(&Token::Not) {
                    self.advance();
                    true
                } else {
                    false
                };
                self.expect(Token::Null)?;
                Ok(Expr::IsNull {
                    operand: left,
                    negated,
                })
            }
            found => Err(format!("expected comparison, found {:?}", found)),
        }
    }

    fn finish_compare(&mut self, left: Operand, op: CmpOp) -> Result<Expr, String> {
        let right = self.parse_operand()?;
        Ok(Expr::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Operand::Attribute(name)),
            Some(Token::Number(n)) => Ok(Operand::Number(n)),
            Some(Token::Str(s)) => Ok(Operand::Text(s)),
            found => Err(format!("expected operand, found {:?}", found)),
        }
    }
}
