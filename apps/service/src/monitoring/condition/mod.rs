//! Sandboxed evaluation of user-written probe conditions.
//!
//! A condition is a small boolean expression such as
//! `response_code == 200 and timespent < 2.0`. The grammar is a subset of
//! Python expressions: literals, the four response variables, boolean,
//! comparison (`in` included) and arithmetic operators, and subscripting of
//! `response_headers`. There are no function calls, no attribute access and
//! no other names, so a condition can only ever look at the response it is
//! given.
//!
//! Any lexing, parsing or runtime error is reported as a [`ConditionError`];
//! the checker counts it as down.

mod eval;
mod lexer;
mod parser;

use thiserror::Error;

pub use eval::{Bindings, Value};
pub use parser::parse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("name {0:?} is not defined")]
    UnknownName(String),
    #[error("{0} are not allowed")]
    NotAllowed(&'static str),
    #[error("expression is nested too deeply")]
    TooDeep,
    #[error("{0}")]
    TypeError(String),
    #[error("header {0:?} not present")]
    KeyError(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

/// Parse and evaluate `condition`, returning the resulting value.
pub fn evaluate(condition: &str, bindings: &Bindings) -> Result<Value, ConditionError> {
    let expr = parse(condition)?;
    eval::eval(&expr, bindings)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    /// Verdict as the checker sees it: errors are false
    fn holds(condition: &str, bindings: &Bindings) -> bool {
        evaluate(condition, bindings).is_ok_and(|value| value.is_truthy())
    }

    fn bindings() -> Bindings {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("X-Count".to_string(), "3".to_string());

        Bindings {
            timespent: 0.42,
            response_code: Some(200),
            response_body: r#"{"status": "ok"}"#.to_string(),
            response_headers: headers,
        }
    }

    #[test]
    fn test_basic_conditions() {
        let b = bindings();
        assert!(holds("response_code == 200 and timespent < 2.0", &b));
        assert!(!holds("response_code == 200 and timespent < 0.1", &b));
        assert!(holds("response_code != 500", &b));
        assert!(holds("200 <= response_code < 300", &b));
        assert!(!holds("300 <= response_code < 400", &b));
        assert!(holds("timespent * 1000 < 500", &b));
    }

    #[test]
    fn test_string_and_header_conditions() {
        let b = bindings();
        assert!(holds(r#"'"status": "ok"' in response_body"#, &b));
        assert!(holds("'error' not in response_body", &b));
        assert!(holds("'Content-Type' in response_headers", &b));
        assert!(holds(r#"response_headers["Content-Type"] == "application/json""#, &b));
        assert!(holds("response_headers['X-Count'] == '3'", &b));
        assert!(holds("response_body", &b));
    }

    #[test]
    fn test_undefined_names_are_false() {
        let b = bindings();
        assert!(!holds("undefined_var > 0", &b));
        assert!(!holds("__import__('os')", &b));
        assert!(!holds("open('/etc/passwd')", &b));
        assert!(!holds("response_body.__class__", &b));
    }

    #[test]
    fn test_runtime_errors_are_false() {
        let b = bindings();
        assert!(!holds("response_headers['Missing'] == 'x'", &b));
        assert!(!holds("response_code / 0 > 1", &b));
        assert!(!holds("response_body > 3", &b));
        assert!(!holds("9223372036854775807 + 1 > 0", &b));
        assert!(!holds("response_code ==", &b));
        assert!(!holds("", &b));

        assert_eq!(
            evaluate("response_headers['Missing']", &b).unwrap_err(),
            ConditionError::KeyError("Missing".into())
        );
        assert!(matches!(
            evaluate("response_body < 1", &b),
            Err(ConditionError::TypeError(_))
        ));
    }

    #[test]
    fn test_absent_status_code() {
        let b = Bindings { response_code: None, ..bindings() };
        assert!(!holds("response_code == 200", &b));
        assert!(holds("response_code == None", &b));
        assert!(!holds("response_code < 500", &b));
        assert!(holds("response_code is None", &b));
        assert!(!holds("response_code is not None", &b));
    }

    #[test]
    fn test_identity_checks() {
        let b = bindings();
        assert!(holds("response_code is not None", &b));
        assert!(holds("response_code is not None and response_code == 200", &b));
        assert!(!holds("response_code is None", &b));
        assert!(holds("True is True", &b));
        assert!(!holds("1 is True", &b));
        assert!(holds("1 == True", &b));
    }

    #[test]
    fn test_long_operator_chains_are_rejected() {
        let b = bindings();
        let condition = format!("response_code == 200 and timespent{}", " + 0".repeat(1000));

        assert_eq!(evaluate(&condition, &b), Err(ConditionError::TooDeep));
        assert!(!holds(&format!("timespent{}", " + 0".repeat(100_000)), &b));
        assert!(!holds(&vec!["response_body"; 5000].join(" or "), &b));
    }

    #[test]
    fn test_python_like_semantics() {
        let b = Bindings::default();
        assert_eq!(evaluate("7 / 2", &b).unwrap(), Value::Float(3.5));
        assert_eq!(evaluate("-7 % 3", &b).unwrap(), Value::Int(2));
        assert_eq!(evaluate("7 % -3", &b).unwrap(), Value::Int(-2));
        assert_eq!(evaluate("1 == 1.0", &b).unwrap(), Value::Bool(true));
        assert_eq!(evaluate("True == 1", &b).unwrap(), Value::Bool(true));
        assert_eq!(evaluate("200 == '200'", &b).unwrap(), Value::Bool(false));
        assert_eq!(evaluate("'a' + 'b'", &b).unwrap(), Value::Str("ab".into()));
        assert_eq!(evaluate("0 or 'x'", &b).unwrap(), Value::Str("x".into()));
        assert_eq!(evaluate("not 0 && !''", &b).unwrap(), Value::Bool(true));
        assert!(!holds("0", &b));
        assert!(!holds("''", &b));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let b = bindings();
        // Names are resolved while parsing, so an unknown one fails even in a skipped branch.
        assert!(!holds("response_code == 200 or undefined_thing", &b));
        assert!(holds("response_code == 200 or response_headers['Missing']", &b));
        assert!(!holds("response_code == 500 and response_headers['Missing']", &b));
    }
}
