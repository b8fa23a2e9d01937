//! Arithmetic expression tool.
//!
//! A small recursive-descent evaluator (no `eval`, no dependencies):
//! `+ - * / % ^`, parentheses, unary minus, decimal numbers.

use async_trait::async_trait;
use serde_json::{json, Value};

use nx_domain::error::{Error, Result};

use crate::runtime::registry::{ExecutableTool, RiskLevel, ToolContext};

pub struct CalculatorTool;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expression evaluator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// expr := term (('+' | '-') term)*
    fn expr(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                b'+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                b'-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    /// term := power (('*' | '/' | '%') power)*
    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.power()?;
        while let Some(op) = self.peek() {
            match op {
                b'*' => {
                    self.pos += 1;
                    value *= self.power()?;
                }
                b'/' => {
                    self.pos += 1;
                    let rhs = self.power()?;
                    if rhs == 0.0 {
                        return Err("division by zero".into());
                    }
                    value /= rhs;
                }
                b'%' => {
                    self.pos += 1;
                    let rhs = self.power()?;
                    if rhs == 0.0 {
                        return Err("division by zero".into());
                    }
                    value %= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    /// power := atom ('^' power)?   (right-associative)
    fn power(&mut self) -> std::result::Result<f64, String> {
        let base = self.atom()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            let exp = self.power()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    /// atom := '-' atom | '(' expr ')' | number
    fn atom(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.atom()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                match self.bump() {
                    Some(b')') => Ok(value),
                    _ => Err("expected ')'".into()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(format!("unexpected character '{}'", c as char)),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, String> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.input.len()
            && (self.input[self.pos].is_ascii_digit() || self.input[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
        text.parse::<f64>().map_err(|_| format!("bad number '{text}'"))
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> std::result::Result<f64, String> {
    let mut parser = Parser::new(expression);
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(format!(
            "trailing input at position {}",
            parser.pos
        ));
    }
    if !value.is_finite() {
        return Err("result is not finite".into());
    }
    Ok(value)
}

/// Integers serialize as integers; everything else as a float.
fn number_value(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl ExecutableTool for CalculatorTool {
    fn id(&self) -> &str {
        "calculator"
    }
    fn name(&self) -> &str {
        "Calculator"
    }
    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (+, -, *, /, %, ^, parentheses)."
    }
    fn category(&self) -> &str {
        "utility"
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
    fn supports_dry_run(&self) -> bool {
        true
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. \"2+2\" or \"(3.5*2)^2\""
                }
            },
            "required": ["expression"]
        })
    }
    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "result": { "type": "number" } }
        })
    }

    async fn execute(&self, input: &Value, _ctx: &ToolContext) -> Result<Value> {
        let expression = input["expression"].as_str().unwrap_or_default();
        let value = evaluate(expression).map_err(|message| Error::ToolExecution {
            tool_id: self.id().to_owned(),
            message,
        })?;
        Ok(json!({ "result": number_value(value) }))
    }

    /// Pure computation: the dry run is the real run.
    async fn dry_run(&self, input: &Value, ctx: &ToolContext) -> Result<Value> {
        self.execute(input, ctx).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_arithmetic() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("10 - 3 * 2").unwrap(), 4.0);
        assert_eq!(evaluate("(10 - 3) * 2").unwrap(), 14.0);
        assert_eq!(evaluate("7 % 3").unwrap(), 1.0);
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0);
    }

    #[test]
    fn unary_minus() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("2 * -3").unwrap(), -6.0);
        assert_eq!(evaluate("--4").unwrap(), 4.0);
    }

    #[test]
    fn decimals() {
        assert!((evaluate("3.5 * 2").unwrap() - 7.0).abs() < 1e-9);
        assert!((evaluate(".5 + .25").unwrap() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn division_by_zero_rejected() {
        assert!(evaluate("1/0").unwrap_err().contains("division by zero"));
        assert!(evaluate("5 % 0").is_err());
    }

    #[test]
    fn malformed_expressions_rejected() {
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("2 + foo").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[test]
    fn integer_results_serialize_as_integers() {
        assert_eq!(number_value(4.0), json!(4));
        assert_eq!(number_value(2.5), json!(2.5));
    }

    #[tokio::test]
    async fn tool_executes_expression() {
        use nx_domain::id::{ProjectId, SessionId, TraceId};
        let ctx = ToolContext::new(
            ProjectId::from("p1"),
            SessionId::from("s1"),
            TraceId::from("t1"),
        );
        let output = CalculatorTool
            .execute(&json!({"expression": "2+2"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output["result"], 4);
    }
}
