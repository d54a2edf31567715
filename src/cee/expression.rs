//! A sandboxed evaluator for the custom valorisation expressions stored in the catalogue.
//!
//! Expressions may only contain numbers, named variables from an [`ExpressionContext`], the
//! operators `+ - * / ^`, and parentheses. There are no function calls and evaluation is a single
//! pass over a shunting-yard conversion, so the cost is linear in the length of the expression.
use indexmap::IndexMap;
use thiserror::Error;

/// Reasons why an expression could not be evaluated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// The expression has no tokens
    #[error("Expression is empty")]
    Empty,
    /// A character which is not part of the grammar, with its byte offset
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),
    /// A number which could not be parsed
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    /// A variable missing from the context
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    /// Parentheses do not pair up
    #[error("Mismatched parentheses")]
    MismatchedParentheses,
    /// Operators and operands do not line up
    #[error("Malformed expression")]
    Malformed,
    /// The result is infinite or not a number
    #[error("Result is not a finite number")]
    NonFinite,
}

/// Named values which an expression may refer to.
///
/// Names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionContext(IndexMap<String, f64>);

impl ExpressionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_ascii_uppercase(), value);
        self
    }

    /// Look up a variable by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(&name.to_ascii_uppercase()).copied()
    }
}

impl<'a> FromIterator<(&'a str, f64)> for ExpressionContext {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut context = Self::new();
        for (name, value) in iter {
            context = context.with(name, value);
        }

        context
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Unary minus binds tighter than `*` and `/` but not `^`, so `-2 ^ 2` is `-4`
const NEG_PRECEDENCE: u8 = 3;

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Pow => 4,
        }
    }

    fn is_right_associative(self) -> bool {
        self == Self::Pow
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::Pow => lhs.powf(rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(Operator),
    Neg,
    LeftParen,
    RightParen,
}

impl Token {
    /// The operator this token stands for in RPN, with its precedence
    fn as_operator(self) -> Option<(Rpn, u8)> {
        match self {
            Self::Op(op) => Some((Rpn::Op(op), op.precedence())),
            Self::Neg => Some((Rpn::Neg, NEG_PRECEDENCE)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rpn {
    Value(f64),
    Op(Operator),
    Neg,
}

/// Evaluate `expression` with the variables in `context`.
///
/// Division by zero and overflow are reported as [`ExpressionError::NonFinite`].
pub fn evaluate(expression: &str, context: &ExpressionContext) -> Result<f64, ExpressionError> {
    let tokens = tokenise(expression, context)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let value = evaluate_rpn(&to_rpn(tokens)?)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExpressionError::NonFinite)
    }
}

fn tokenise(expression: &str, context: &ExpressionContext) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    // A minus sign is unary at the start, after an operator or after an opening parenthesis
    let mut expect_operand = true;
    while let Some((pos, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '0'..='9' | '.' | ',' => {
                let mut text = c.to_string();
                while let Some((_, next)) =
                    chars.next_if(|(_, n)| n.is_ascii_digit() || *n == '.' || *n == ',')
                {
                    text.push(next);
                }
                let value = text
                    .replace(',', ".")
                    .parse()
                    .map_err(|_| ExpressionError::InvalidNumber(text.clone()))?;
                Token::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = c.to_string();
                while let Some((_, next)) =
                    chars.next_if(|(_, n)| n.is_ascii_alphanumeric() || *n == '_')
                {
                    name.push(next);
                }
                let value = context
                    .get(&name)
                    .ok_or(ExpressionError::UnknownVariable(name))?;
                Token::Number(value)
            }
            '+' if expect_operand => continue,
            '-' if expect_operand => Token::Neg,
            '+' => Token::Op(Operator::Add),
            '-' => Token::Op(Operator::Sub),
            '*' | '×' => Token::Op(Operator::Mul),
            '/' | '÷' => Token::Op(Operator::Div),
            '^' => Token::Op(Operator::Pow),
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            _ => return Err(ExpressionError::UnexpectedCharacter(c, pos)),
        };

        expect_operand = matches!(token, Token::Op(_) | Token::Neg | Token::LeftParen);
        tokens.push(token);
    }

    Ok(tokens)
}

/// Convert infix tokens to reverse Polish notation (shunting-yard)
fn to_rpn(tokens: Vec<Token>) -> Result<Vec<Rpn>, ExpressionError> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(value) => output.push(Rpn::Value(value)),
            Token::Neg | Token::LeftParen => stack.push(token),
            Token::Op(op) => {
                while let Some((top, precedence)) = stack.last().and_then(|t| t.as_operator()) {
                    let pops = if op.is_right_associative() {
                        precedence > op.precedence()
                    } else {
                        precedence >= op.precedence()
                    };
                    if !pops {
                        break;
                    }
                    output.push(top);
                    stack.pop();
                }
                stack.push(token);
            }
            Token::RightParen => loop {
                match stack.pop() {
                    Some(Token::LeftParen) => break,
                    Some(token) => match token.as_operator() {
                        Some((op, _)) => output.push(op),
                        None => return Err(ExpressionError::MismatchedParentheses),
                    },
                    None => return Err(ExpressionError::MismatchedParentheses),
                }
            },
        }
    }

    while let Some(token) = stack.pop() {
        let (op, _) = token
            .as_operator()
            .ok_or(ExpressionError::MismatchedParentheses)?;
        output.push(op);
    }

    Ok(output)
}

fn evaluate_rpn(rpn: &[Rpn]) -> Result<f64, ExpressionError> {
    let mut stack: Vec<f64> = Vec::with_capacity(rpn.len());
    for item in rpn {
        let value = match *item {
            Rpn::Value(value) => value,
            Rpn::Neg => -stack.pop().ok_or(ExpressionError::Malformed)?,
            Rpn::Op(op) => {
                let rhs = stack.pop().ok_or(ExpressionError::Malformed)?;
                let lhs = stack.pop().ok_or(ExpressionError::Malformed)?;
                op.apply(lhs, rhs)
            }
        };
        stack.push(value);
    }

    match stack.as_slice() {
        [value] => Ok(*value),
        _ => Err(ExpressionError::Malformed),
    }
}
