//! Condition parser for the config file rule syntax.
//!
//! Recursive descent over strings like:
//!
//! ```text
//! market:price < 50
//! portfolio:open_positions == 0
//! date:today+30d >= market:expiry
//! trade:underlying == "SPX"
//! ```
//!
//! Each side is a field reference (`source:name`), a number, or a quoted
//! string; the middle token is a relational operator. Errors carry the
//! character offset of the failure.

use crate::domain::comparison::{ComparisonField, DateOffset, OffsetUnit, Operator, Value};
use crate::domain::error::ParseError;
use crate::domain::trade_rule::Condition;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn parse_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        let mut digits = 0;
        let mut has_dot = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else if ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if digits == 0 {
            return Err(ParseError {
                message: "expected a number".into(),
                position: start,
            });
        }
        let text: String = self.input[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        text.parse().map_err(|_| ParseError {
            message: format!("invalid number '{text}'"),
            position: start,
        })
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(text),
                Some(ch) => text.push(ch),
                None => {
                    return Err(ParseError {
                        message: "unterminated string".into(),
                        position: start,
                    });
                }
            }
        }
    }

    fn parse_operator(&mut self) -> Result<Operator, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let rest = self.remaining();
        let (op, len) = if rest.starts_with("==") {
            (Operator::Eq, 2)
        } else if rest.starts_with("!=") {
            (Operator::Ne, 2)
        } else if rest.starts_with("<=") {
            (Operator::Le, 2)
        } else if rest.starts_with(">=") {
            (Operator::Ge, 2)
        } else if rest.starts_with('<') {
            (Operator::Lt, 1)
        } else if rest.starts_with('>') {
            (Operator::Gt, 1)
        } else {
            return Err(ParseError {
                message: "expected an operator (==, !=, <, <=, >, >=)".into(),
                position: start,
            });
        };
        self.pos += len;
        Ok(op)
    }

    fn parse_date_offset(&mut self) -> Result<Option<DateOffset>, ParseError> {
        match self.peek() {
            Some('+') | Some('-') => {}
            _ => return Ok(None),
        }
        let sign = if self.advance() == Some('-') { -1 } else { 1 };
        let start = self.pos;
        let amount = self.parse_number()? as i32;
        let unit = match self.advance() {
            Some('d') => OffsetUnit::Days,
            Some('w') => OffsetUnit::Weeks,
            Some('m') => OffsetUnit::Months,
            Some('y') => OffsetUnit::Years,
            _ => {
                return Err(ParseError {
                    message: "expected an offset unit (d, w, m, y)".into(),
                    position: start,
                });
            }
        };
        Ok(Some(DateOffset {
            amount: sign * amount,
            unit,
        }))
    }

    fn parse_field(&mut self) -> Result<ComparisonField, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("expected a field, number or string")),
            Some('"') => {
                let text = self.parse_quoted()?;
                Ok(ComparisonField::Static {
                    value: Value::Text(text),
                })
            }
            Some(ch) if ch.is_ascii_digit() || ch == '-' => {
                let number = self.parse_number()?;
                Ok(ComparisonField::Static {
                    value: Value::Number(number),
                })
            }
            Some(_) => {
                let source_start = self.pos;
                let source = self.parse_word();
                if self.peek() != Some(':') {
                    return Err(ParseError {
                        message: format!("expected ':' after '{source}'"),
                        position: self.pos,
                    });
                }
                self.advance();
                let name_start = self.pos;
                let name = self.parse_word();
                if name.is_empty() {
                    return Err(ParseError {
                        message: "expected a field name".into(),
                        position: name_start,
                    });
                }
                match source.as_str() {
                    "market" => Ok(ComparisonField::Market { field: name }),
                    "trade" => Ok(ComparisonField::Trade { field: name }),
                    "portfolio" => Ok(ComparisonField::Portfolio { field: name }),
                    "date" => {
                        if name != "today" {
                            return Err(ParseError {
                                message: format!("unknown date field '{name}'"),
                                position: name_start,
                            });
                        }
                        let offset = self.parse_date_offset()?;
                        Ok(ComparisonField::Today { offset })
                    }
                    _ => Err(ParseError {
                        message: format!(
                            "unknown field source '{source}' \
                             (expected market, trade, portfolio or date)"
                        ),
                        position: source_start,
                    }),
                }
            }
        }
    }
}

/// Parse one `left op right` condition.
pub fn parse_condition(input: &str) -> Result<Condition, ParseError> {
    let mut parser = Parser::new(input);
    let left = parser.parse_field()?;
    let op = parser.parse_operator()?;
    let right = parser.parse_field()?;
    parser.skip_whitespace();
    if parser.peek().is_some() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(Condition { left, op, right })
}
