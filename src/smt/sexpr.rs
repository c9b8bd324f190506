//! S-expression reader for SMT-LIB2 text
//!
//! Used for cached formulas and for solver output (`get-model` responses).

use thiserror::Error;

use super::term::Term;

/// A parsed s-expression
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    /// Plain symbol or keyword, e.g. `and`, `:timeout`
    Symbol(String),
    /// Symbol written as `|...|`; never treated as a keyword
    Quoted(String),
    Numeral(String),
    Decimal(String),
    Str(String),
    List(Vec<SExpr>),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unexpected `)` at offset {0}")]
    UnexpectedClose(usize),

    #[error("unterminated {0} starting at offset {1}")]
    Unterminated(&'static str, usize),

    #[error("invalid term: {0}")]
    InvalidTerm(String),

    #[error("invalid formula: {0}")]
    InvalidFormula(String),
}

struct Reader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_trivia();
        self.pos >= self.input.len()
    }

    fn read(&mut self) -> Result<SExpr, ParseError> {
        self.skip_trivia();
        let start = self.pos;
        match self.peek() {
            None => Err(ParseError::UnexpectedEof),
            Some('(') => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    self.skip_trivia();
                    match self.peek() {
                        None => return Err(ParseError::Unterminated("list", start)),
                        Some(')') => {
                            self.bump();
                            return Ok(SExpr::List(items));
                        }
                        Some(_) => items.push(self.read()?),
                    }
                }
            }
            Some(')') => Err(ParseError::UnexpectedClose(start)),
            Some('|') => {
                self.bump();
                let body_start = self.pos;
                loop {
                    match self.bump() {
                        None => return Err(ParseError::Unterminated("quoted symbol", start)),
                        Some('|') => {
                            let name = &self.input[body_start..self.pos - 1];
                            return Ok(SExpr::Quoted(name.to_string()));
                        }
                        Some(_) => {}
                    }
                }
            }
            Some('"') => {
                self.bump();
                let mut text = String::new();
                loop {
                    match self.bump() {
                        None => return Err(ParseError::Unterminated("string", start)),
                        // SMT-LIB2 escapes a quote by doubling it
                        Some('"') if self.peek() == Some('"') => {
                            self.bump();
                            text.push('"');
                        }
                        Some('"') => return Ok(SExpr::Str(text)),
                        Some(c) => text.push(c),
                    }
                }
            }
            Some(_) => {
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '|' | '"' | ';') {
                        break;
                    }
                    self.bump();
                }
                Ok(classify_atom(&self.input[start..self.pos]))
            }
        }
    }
}

fn classify_atom(atom: &str) -> SExpr {
    if !atom.is_empty() && atom.bytes().all(|b| b.is_ascii_digit()) {
        return SExpr::Numeral(atom.to_string());
    }
    if let Some((whole, frac)) = atom.split_once('.')
        && !whole.is_empty()
        && !frac.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
    {
        return SExpr::Decimal(atom.to_string());
    }
    SExpr::Symbol(atom.to_string())
}

/// Parse every top-level s-expression in `input`
pub fn parse_all(input: &str) -> Result<Vec<SExpr>, ParseError> {
    let mut reader = Reader::new(input);
    let mut out = Vec::new();
    while !reader.at_end() {
        out.push(reader.read()?);
    }
    Ok(out)
}

/// Parse exactly one s-expression, ignoring surrounding whitespace and comments
pub fn parse_one(input: &str) -> Result<SExpr, ParseError> {
    let mut reader = Reader::new(input);
    let expr = reader.read()?;
    if !reader.at_end() {
        return Err(ParseError::InvalidTerm(format!(
            "trailing input after expression: {}",
            reader.rest().trim()
        )));
    }
    Ok(expr)
}

/// Net parenthesis depth of a chunk of solver output, ignoring quoted symbols and strings
///
/// Solvers print models over several lines; a reader keeps consuming lines
/// until the running depth returns to zero.
pub fn paren_balance(chunk: &str) -> i64 {
    let mut depth = 0i64;
    let mut in_quote = false;
    let mut in_string = false;
    for c in chunk.chars() {
        match c {
            '|' if !in_string => in_quote = !in_quote,
            '"' if !in_quote => in_string = !in_string,
            '(' if !in_quote && !in_string => depth += 1,
            ')' if !in_quote && !in_string => depth -= 1,
            _ => {}
        }
    }
    depth
}

impl SExpr {
    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// Symbol name, quoted or not
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            SExpr::Symbol(name) | SExpr::Quoted(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, SExpr::Symbol(s) if s == name)
    }

    /// Convert to a term
    pub fn to_term(&self) -> Result<Term, ParseError> {
        match self {
            SExpr::Symbol(name) if name == "true" => Ok(Term::Bool(true)),
            SExpr::Symbol(name) if name == "false" => Ok(Term::Bool(false)),
            SExpr::Symbol(name) | SExpr::Quoted(name) => Ok(Term::Symbol(name.clone())),
            SExpr::Numeral(text) => parse_numeral(text).map(Term::Int),
            SExpr::Decimal(text) => parse_decimal(text).map(Term::Real),
            SExpr::Str(text) => Err(ParseError::InvalidTerm(format!(
                "string literal \"{text}\" is not supported"
            ))),
            SExpr::List(items) => {
                let (head, args) = items
                    .split_first()
                    .ok_or_else(|| ParseError::InvalidTerm("empty application".to_string()))?;
                let op = match head {
                    SExpr::Symbol(op) => op,
                    other => {
                        return Err(ParseError::InvalidTerm(format!(
                            "application head must be a symbol, got {other:?}"
                        )));
                    }
                };
                // (- literal) denotes a negative literal
                if op == "-" && args.len() == 1 {
                    match &args[0] {
                        SExpr::Numeral(text) => return parse_numeral(text).map(|v| Term::Int(-v)),
                        SExpr::Decimal(text) => {
                            return parse_decimal(text).map(|v| Term::Real(-v));
                        }
                        _ => {}
                    }
                }
                let args = args
                    .iter()
                    .map(SExpr::to_term)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Term::App(op.clone(), args))
            }
        }
    }
}

fn parse_numeral(text: &str) -> Result<i64, ParseError> {
    text.parse()
        .map_err(|_| ParseError::InvalidTerm(format!("numeral out of range: {text}")))
}

fn parse_decimal(text: &str) -> Result<f64, ParseError> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::InvalidTerm(format!("invalid decimal: {text}")))
}

/// Parse a single term from text
pub fn parse_term(input: &str) -> Result<Term, ParseError> {
    parse_one(input)?.to_term()
}
