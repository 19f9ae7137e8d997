//! Boolean conditions of `IF ... GOTO`
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr   := term (("OR" | "||") term)*
//! term   := factor (("AND" | "&&") factor)*
//! factor := ("NOT" | "!") factor | "(" expr ")" | "TRUE" | "FALSE"
//! ```

use thiserror::Error;

use super::{COND_FALSE, COND_TRUE};

/// Malformed condition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// Nothing to evaluate
    #[error("empty condition")]
    Empty,
    /// A token that does not fit the grammar at this position
    #[error("unexpected token [{0}]")]
    UnexpectedToken(String),
    /// Input ended in the middle of an expression
    #[error("unexpected end of condition")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Value(bool),
    And,
    Or,
    Not,
    Open,
    Close,
}

/// Evaluate a fully expanded condition
pub fn evaluate(expr: &str) -> Result<bool, ConditionError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;

    match parser.tokens.get(parser.pos) {
        None => Ok(value),
        Some(token) => Err(ConditionError::UnexpectedToken(describe(token))),
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut rest = expr.trim_start();

    while let Some(c) = rest.chars().next() {
        let (token, len) = match c {
            '(' => (Token::Open, 1),
            ')' => (Token::Close, 1),
            '!' => (Token::Not, 1),
            '&' if rest.starts_with("&&") => (Token::And, 2),
            '|' if rest.starts_with("||") => (Token::Or, 2),
            _ => {
                let len = rest
                    .find(|ch: char| ch.is_whitespace() || "()!&|".contains(ch))
                    .unwrap_or(rest.len())
                    .max(c.len_utf8());
                let word = &rest[..len];
                let token = match word {
                    COND_TRUE => Token::Value(true),
                    COND_FALSE => Token::Value(false),
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    other => return Err(ConditionError::UnexpectedToken(other.to_string())),
                };
                (token, len)
            }
        };
        tokens.push(token);
        rest = rest[len..].trim_start();
    }

    Ok(tokens)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Value(true) => COND_TRUE.to_string(),
        Token::Value(false) => COND_FALSE.to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Not => "NOT".to_string(),
        Token::Open => "(".to_string(),
        Token::Close => ")".to_string(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<bool, ConditionError> {
        let mut value = self.term()?;
        while self.eat(&Token::Or) {
            // both sides are always parsed so malformed input is caught
            let rhs = self.term()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<bool, ConditionError> {
        let mut value = self.factor()?;
        while self.eat(&Token::And) {
            let rhs = self.factor()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<bool, ConditionError> {
        match self.next() {
            Some(Token::Value(v)) => Ok(v),
            Some(Token::Not) => Ok(!self.factor()?),
            Some(Token::Open) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    Some(other) => Err(ConditionError::UnexpectedToken(describe(&other))),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ConditionError::UnexpectedToken(describe(&other))),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(evaluate("TRUE"), Ok(true));
        assert_eq!(evaluate("  FALSE "), Ok(false));
    }

    #[test]
    fn test_operators() {
        assert_eq!(evaluate("TRUE AND FALSE"), Ok(false));
        assert_eq!(evaluate("TRUE && TRUE"), Ok(true));
        assert_eq!(evaluate("FALSE OR TRUE"), Ok(true));
        assert_eq!(evaluate("FALSE||FALSE"), Ok(false));
        assert_eq!(evaluate("NOT FALSE"), Ok(true));
        assert_eq!(evaluate("!TRUE"), Ok(false));
        assert_eq!(evaluate("!!TRUE"), Ok(true));
    }

    #[test]
    fn test_precedence() {
        // AND binds tighter than OR
        assert_eq!(evaluate("TRUE OR TRUE AND FALSE"), Ok(true));
        assert_eq!(evaluate("(TRUE OR TRUE) AND FALSE"), Ok(false));
        // NOT binds tighter than AND
        assert_eq!(evaluate("!FALSE && FALSE"), Ok(false));
        assert_eq!(evaluate("!(FALSE && FALSE)"), Ok(true));
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(
            evaluate("true"),
            Err(ConditionError::UnexpectedToken("true".into()))
        );
    }

    #[test]
    fn test_malformed() {
        assert_eq!(evaluate(""), Err(ConditionError::Empty));
        assert_eq!(evaluate("TRUE AND"), Err(ConditionError::UnexpectedEnd));
        assert_eq!(evaluate("(TRUE"), Err(ConditionError::UnexpectedEnd));
        assert_eq!(
            evaluate("TRUE FALSE"),
            Err(ConditionError::UnexpectedToken("FALSE".into()))
        );
        assert_eq!(
            evaluate("TRUE & FALSE"),
            Err(ConditionError::UnexpectedToken("&".into()))
        );
        assert_eq!(
            evaluate("$READY"),
            Err(ConditionError::UnexpectedToken("$READY".into()))
        );
    }
}
