use super::ConditionError;
use super::eval::Value;
use super::lexer::{Token, tokenize};

/// Nesting budget of an expression. Parentheses, subscripts, unary operators
/// and every operator of a binary or comparison chain each use one level, so
/// the tree that evaluation walks is never deeper than this.
pub const MAX_DEPTH: usize = 64;

/// The only names an expression can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Timespent,
    ResponseCode,
    ResponseBody,
    ResponseHeaders,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "timespent" => Some(Self::Timespent),
            "response_code" => Some(Self::ResponseCode),
            "response_body" => Some(Self::ResponseBody),
            "response_headers" => Some(Self::ResponseHeaders),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(Variable),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Pos(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `a < b <= c` keeps every operand so each is evaluated at most once
    Compare { first: Box<Expr>, rest: Vec<(CompareOp, Expr)> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Index { target: Box<Expr>, key: Box<Expr> },
}

/// Parse a condition into an expression tree.
pub fn parse(input: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let expr = parser.parse_or()?;

    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ConditionError::UnexpectedToken(describe(token))),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => name.clone(),
        Token::Int(value) => value.to_string(),
        Token::Float(value) => value.to_string(),
        Token::Str(value) => format!("{value:?}"),
        Token::Symbol(symbol) => symbol.to_string(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol)
    }

    fn eat_keyword_or_symbol(&mut self, keyword: &str, symbol: &str) -> bool {
        if self.is_keyword(keyword) || self.is_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), ConditionError> {
        match self.next() {
            Some(Token::Symbol(s)) if s == symbol => Ok(()),
            Some(token) => Err(ConditionError::UnexpectedToken(describe(&token))),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }

    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::TooDeep);
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.ascend_by(1);
    }

    fn ascend_by(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_and()?;
        let mut chained = 0;
        while self.eat_keyword_or_symbol("or", "||") {
            self.descend()?;
            chained += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.ascend_by(chained);
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_not()?;
        let mut chained = 0;
        while self.eat_keyword_or_symbol("and", "&&") {
            self.descend()?;
            chained += 1;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.ascend_by(chained);
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.eat_keyword_or_symbol("not", "!") {
            self.descend()?;
            let inner = self.parse_not()?;
            self.ascend();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn compare_op(&self) -> Option<(CompareOp, usize)> {
        match self.peek()? {
            Token::Symbol("==") => Some((CompareOp::Eq, 1)),
            Token::Symbol("!=") => Some((CompareOp::NotEq, 1)),
            Token::Symbol("<") => Some((CompareOp::Lt, 1)),
            Token::Symbol("<=") => Some((CompareOp::LtEq, 1)),
            Token::Symbol(">") => Some((CompareOp::Gt, 1)),
            Token::Symbol(">=") => Some((CompareOp::GtEq, 1)),
            Token::Ident(name) if name == "in" => Some((CompareOp::In, 1)),
            Token::Ident(name) if name == "is" => match self.peek_at(1) {
                Some(Token::Ident(next)) if next == "not" => Some((CompareOp::IsNot, 2)),
                _ => Some((CompareOp::Is, 1)),
            },
            Token::Ident(name) if name == "not" => match self.peek_at(1) {
                Some(Token::Ident(next)) if next == "in" => Some((CompareOp::NotIn, 2)),
                _ => None,
            },
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();

        while let Some((op, width)) = self.compare_op() {
            self.pos += width;
            self.descend()?;
            rest.push((op, self.parse_additive()?));
        }
        self.ascend_by(rest.len());

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare { first: Box::new(first), rest })
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_term()?;
        let mut chained = 0;
        loop {
            let op = if self.is_symbol("+") {
                BinaryOp::Add
            } else if self.is_symbol("-") {
                BinaryOp::Sub
            } else {
                self.ascend_by(chained);
                return Ok(lhs);
            };
            self.pos += 1;
            self.descend()?;
            chained += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_unary()?;
        let mut chained = 0;
        loop {
            let op = if self.is_symbol("*") {
                BinaryOp::Mul
            } else if self.is_symbol("/") {
                BinaryOp::Div
            } else if self.is_symbol("%") {
                BinaryOp::Rem
            } else {
                self.ascend_by(chained);
                return Ok(lhs);
            };
            self.pos += 1;
            self.descend()?;
            chained += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        let wrap: Option<fn(Box<Expr>) -> Expr> = if self.is_symbol("-") {
            Some(Expr::Neg)
        } else if self.is_symbol("+") {
            Some(Expr::Pos)
        } else {
            None
        };

        match wrap {
            Some(wrap) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.parse_unary()?;
                self.ascend();
                Ok(wrap(Box::new(inner)))
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ConditionError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.is_symbol("[") {
                self.pos += 1;
                self.descend()?;
                let key = self.parse_or()?;
                self.ascend();
                self.expect_symbol("]")?;
                expr = Expr::Index { target: Box::new(expr), key: Box::new(key) };
            } else if self.is_symbol(".") {
                return Err(ConditionError::NotAllowed("attribute access"));
            } else if self.is_symbol("(") {
                return Err(ConditionError::NotAllowed("function calls"));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.next().ok_or(ConditionError::UnexpectedEnd)? {
            Token::Int(value) => Ok(Expr::Literal(Value::Int(value))),
            Token::Float(value) => Ok(Expr::Literal(Value::Float(value))),
            Token::Str(value) => Ok(Expr::Literal(Value::Str(value))),
            Token::Symbol("(") => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.ascend();
                self.expect_symbol(")")?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "True" | "true" => Ok(Expr::Literal(Value::Bool(true))),
                "False" | "false" => Ok(Expr::Literal(Value::Bool(false))),
                "None" | "null" => Ok(Expr::Literal(Value::None)),
                _ => Variable::from_name(&name)
                    .map(Expr::Var)
                    .ok_or(ConditionError::UnknownName(name)),
            },
            token => Err(ConditionError::UnexpectedToken(describe(&token))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse("response_code == 200 and timespent < 2.0 or not response_body").unwrap();
        let Expr::Or(lhs, rhs) = expr else { panic!("expected or") };
        assert!(matches!(*lhs, Expr::And(_, _)));
        assert!(matches!(*rhs, Expr::Not(_)));
    }

    #[test]
    fn test_arithmetic_binds_tighter_than_comparison() {
        let expr = parse("timespent * 1000 < 500 + 1").unwrap();
        let Expr::Compare { first, rest } = expr else { panic!("expected comparison") };
        assert!(matches!(*first, Expr::Binary { op: BinaryOp::Mul, .. }));
        assert_eq!(rest.len(), 1);
        assert!(matches!(rest[0].1, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_not_in_and_chains() {
        let expr = parse("'error' not in response_body").unwrap();
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest[0].0 == CompareOp::NotIn));

        let expr = parse("200 <= response_code < 300").unwrap();
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest.len() == 2));
    }

    #[test]
    fn test_subscript() {
        let expr = parse(r#"response_headers["Content-Type"] == "application/json""#).unwrap();
        let Expr::Compare { first, .. } = expr else { panic!("expected comparison") };
        assert!(matches!(*first, Expr::Index { .. }));
    }

    #[test]
    fn test_rejects_unknown_names() {
        assert_eq!(
            parse("undefined_var > 0").unwrap_err(),
            ConditionError::UnknownName("undefined_var".into())
        );
        assert!(matches!(parse("__import__"), Err(ConditionError::UnknownName(_))));
    }

    #[test]
    fn test_rejects_calls_and_attributes() {
        assert_eq!(
            parse("response_body.startswith('x')").unwrap_err(),
            ConditionError::NotAllowed("attribute access")
        );
        assert_eq!(
            parse("response_code(1)").unwrap_err(),
            ConditionError::NotAllowed("function calls")
        );
    }

    #[test]
    fn test_rejects_trailing_and_incomplete_input() {
        assert!(matches!(parse("1 2"), Err(ConditionError::UnexpectedToken(_))));
        assert_eq!(parse("response_code ==").unwrap_err(), ConditionError::UnexpectedEnd);
        assert_eq!(parse("(1").unwrap_err(), ConditionError::UnexpectedEnd);
        assert_eq!(parse("").unwrap_err(), ConditionError::UnexpectedEnd);
    }

    #[test]
    fn test_depth_limit() {
        let nested = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&nested).unwrap_err(), ConditionError::TooDeep);

        let negations = format!("{}1", "-".repeat(MAX_DEPTH * 4));
        assert_eq!(parse(&negations).unwrap_err(), ConditionError::TooDeep);

        let ok = format!("{}1{}", "(".repeat(8), ")".repeat(8));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_depth_limit_counts_operator_chains() {
        let long_sum = format!("timespent{}", " + 0".repeat(100_000));
        assert_eq!(parse(&long_sum).unwrap_err(), ConditionError::TooDeep);

        let long_condition = format!("response_code == 200 and timespent{}", " + 0".repeat(1000));
        assert_eq!(parse(&long_condition).unwrap_err(), ConditionError::TooDeep);

        let long_and = vec!["True"; 10_000].join(" and ");
        assert_eq!(parse(&long_and).unwrap_err(), ConditionError::TooDeep);

        let long_product = format!("1{}", " * 1".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&long_product).unwrap_err(), ConditionError::TooDeep);

        let long_chain = format!("0{}", " < 1".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&long_chain).unwrap_err(), ConditionError::TooDeep);

        // Levels are released once a chain ends, so siblings don't add up
        let siblings = vec![format!("(1{})", " + 1".repeat(MAX_DEPTH / 2)); 20].join(" == ");
        assert!(parse(&siblings).is_ok());

        let within = format!("timespent{}", " + 0".repeat(MAX_DEPTH - 1));
        assert!(parse(&within).is_ok());
    }

    #[test]
    fn test_identity_comparisons() {
        let expr = parse("response_code is not None").unwrap();
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest[0].0 == CompareOp::IsNot));

        let expr = parse("response_code is None").unwrap();
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest[0].0 == CompareOp::Is));
    }
}
