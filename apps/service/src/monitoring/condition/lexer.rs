use super::ConditionError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Operators and punctuation
    Symbol(&'static str),
}

/// Longest symbols first so `<=` is not read as `<` followed by `=`.
static SYMBOLS: [&str; 19] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "(", ")", "[", "]",
    "!", ".",
];

pub(super) fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' || ch == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c == ch {
                    closed = true;
                    break;
                }
                if c == '\\' {
                    let (_, escaped) = chars.next().ok_or(ConditionError::UnterminatedString(pos))?;
                    value.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        other => other,
                    });
                    continue;
                }
                value.push(c);
            }
            if !closed {
                return Err(ConditionError::UnterminatedString(pos));
            }
            tokens.push(Token::Str(value));
            continue;
        }

        if ch.is_ascii_digit() {
            let mut literal = String::new();
            let mut is_float = false;
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '_' {
                    if c != '_' {
                        literal.push(c);
                    }
                    chars.next();
                } else if c == '.' && !is_float {
                    is_float = true;
                    literal.push(c);
                    chars.next();
                } else if (c == 'e' || c == 'E') && !literal.contains(['e', 'E']) {
                    is_float = true;
                    literal.push(c);
                    chars.next();
                    if let Some(&(_, sign)) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            literal.push(sign);
                            chars.next();
                        }
                    }
                } else {
                    break;
                }
            }
            let token = if is_float {
                literal.parse().map(Token::Float).ok()
            } else {
                literal.parse().map(Token::Int).ok()
            };
            tokens.push(token.ok_or(ConditionError::InvalidNumber(literal))?);
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
            continue;
        }

        let rest = &input[pos..];
        let symbol = SYMBOLS
            .iter()
            .copied()
            .find(|symbol| rest.starts_with(*symbol))
            .ok_or(ConditionError::UnexpectedChar(ch, pos))?;
        for _ in 0..symbol.len() {
            chars.next();
        }
        tokens.push(Token::Symbol(symbol));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed() {
        let tokens = tokenize(r#"response_code >= 200 and 'ok' in response_body || 1.5e1"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("response_code".into()),
                Token::Symbol(">="),
                Token::Int(200),
                Token::Ident("and".into()),
                Token::Str("ok".into()),
                Token::Ident("in".into()),
                Token::Ident("response_body".into()),
                Token::Symbol("||"),
                Token::Float(15.0),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#""a\"b\n" 'c\'d'"#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\"b\n".into()), Token::Str("c'd".into())]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize("'open").unwrap_err(), ConditionError::UnterminatedString(0));
        assert_eq!(tokenize("a ; b").unwrap_err(), ConditionError::UnexpectedChar(';', 2));
        assert!(matches!(tokenize("99999999999999999999"), Err(ConditionError::InvalidNumber(_))));
    }
}
