//! Built-in expression language
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | compare
//! compare := sum (("<" | "<=" | ">" | ">=" | "==" | "=" | "<>") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := "-" unary | power
//! power   := primary ("^" unary)?
//! primary := number | name | name "(" args ")" | "(" or ")"
//! ```
//!
//! Names may contain dots (`Entity.Process_1.M1SaveAttribute`). Keywords and
//! function names are case-insensitive; references are not.

use super::{EvalScope, ExpressionError, ExpressionEvaluator};
use crate::rng::RngManager;
use std::collections::HashMap;

/// Tolerance for equality comparisons
const FLOAT_EPSILON: f64 = 1e-9;

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Reference(String),
    Call { name: String, args: Vec<Node> },
    Negate(Box<Node>),
    Not(Box<Node>),
    Binary {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Known functions: lowercase name and argument count
const FUNCTIONS: &[(&str, usize)] = &[
    ("expo", 1),
    ("unif", 2),
    ("tria", 3),
    ("norm", 2),
    ("erla", 2),
    ("logn", 2),
    ("const", 1),
    ("nq", 1),
    ("nr", 1),
    ("mr", 1),
];

// ============================================================================
// LEXER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("bad number '{text}'"))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Name(chars[start..i].iter().collect()));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (op, width) = match (c, next) {
            ('<', Some('=')) => ("<=", 2),
            ('<', Some('>')) => ("<>", 2),
            ('>', Some('=')) => (">=", 2),
            ('=', Some('=')) => ("==", 2),
            ('!', Some('=')) => ("<>", 2),
            ('<', _) => ("<", 1),
            ('>', _) => (">", 1),
            ('=', _) => ("==", 1),
            ('+', _) => ("+", 1),
            ('-', _) => ("-", 1),
            ('*', _) => ("*", 1),
            ('/', _) => ("/", 1),
            ('^', _) => ("^", 1),
            ('(', _) => {
                tokens.push(Token::LParen);
                i += 1;
                continue;
            }
            (')', _) => {
                tokens.push(Token::RParen);
                i += 1;
                continue;
            }
            (',', _) => {
                tokens.push(Token::Comma);
                i += 1;
                continue;
            }
            _ => return Err(format!("unexpected character '{c}'")),
        };
        tokens.push(Token::Op(op));
        i += width;
    }

    Ok(tokens)
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n.eq_ignore_ascii_case(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Node, String> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Node, String> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            let right = self.not()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Node, String> {
        if self.eat_keyword("not") {
            return Ok(Node::Not(Box::new(self.not()?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Node, String> {
        let left = self.sum()?;
        let op = match self.peek() {
            Some(Token::Op("<")) => BinOp::Lt,
            Some(Token::Op("<=")) => BinOp::Le,
            Some(Token::Op(">")) => BinOp::Gt,
            Some(Token::Op(">=")) => BinOp::Ge,
            Some(Token::Op("==")) => BinOp::Eq,
            Some(Token::Op("<>")) => BinOp::Ne,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.sum()?;
        Ok(binary(op, left, right))
    }

    fn sum(&mut self) -> Result<Node, String> {
        let mut left = self.product()?;
        loop {
            if self.eat_op("+") {
                left = binary(BinOp::Add, left, self.product()?);
            } else if self.eat_op("-") {
                left = binary(BinOp::Sub, left, self.product()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn product(&mut self) -> Result<Node, String> {
        let mut left = self.unary()?;
        loop {
            if self.eat_op("*") {
                left = binary(BinOp::Mul, left, self.unary()?);
            } else if self.eat_op("/") {
                left = binary(BinOp::Div, left, self.unary()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn unary(&mut self) -> Result<Node, String> {
        if self.eat_op("-") {
            return Ok(Node::Negate(Box::new(self.unary()?)));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Node, String> {
        let base = self.primary()?;
        if self.eat_op("^") {
            let exponent = self.unary()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node, String> {
        match self.bump() {
            Some(Token::Number(value)) => Ok(Node::Number(value)),
            Some(Token::LParen) => {
                let inner = self.or()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(Token::Name(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Node::Reference(name));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                } else {
                    loop {
                        args.push(self.or()?);
                        match self.bump() {
                            Some(Token::Comma) => continue,
                            Some(Token::RParen) => break,
                            _ => return Err(format!("expected ',' or ')' in call to {name}")),
                        }
                    }
                }
                Ok(Node::Call {
                    name: name.to_ascii_lowercase(),
                    args,
                })
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn binary(op: BinOp, left: Node, right: Node) -> Node {
    Node::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn parse(expression: &str) -> Result<Node, ExpressionError> {
    let parse_error = |message: String| ExpressionError::Parse {
        expression: expression.to_string(),
        message,
    };

    let tokens = tokenize(expression).map_err(parse_error)?;
    if tokens.is_empty() {
        return Err(parse_error("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.or().map_err(parse_error)?;
    if parser.pos < parser.tokens.len() {
        return Err(parse_error(format!(
            "unexpected trailing input at token {}",
            parser.pos
        )));
    }
    validate(&node)?;
    Ok(node)
}

/// Function names and arities
fn validate(node: &Node) -> Result<(), ExpressionError> {
    match node {
        Node::Number(_) | Node::Reference(_) => Ok(()),
        Node::Negate(inner) | Node::Not(inner) => validate(inner),
        Node::Binary { left, right, .. } => {
            validate(left)?;
            validate(right)
        }
        Node::Call { name, args } => {
            let expected = FUNCTIONS
                .iter()
                .find(|(f, _)| f == name)
                .map(|(_, arity)| *arity)
                .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
            if args.len() != expected {
                return Err(ExpressionError::Arity {
                    function: name.clone(),
                    expected,
                    found: args.len(),
                });
            }
            if matches!(name.as_str(), "nq" | "nr" | "mr") {
                if !matches!(args[0], Node::Reference(_)) {
                    return Err(ExpressionError::InvalidArgument {
                        function: name.clone(),
                        message: "expected a name".to_string(),
                    });
                }
                return Ok(());
            }
            args.iter().try_for_each(validate)
        }
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

fn truth(value: f64) -> bool {
    value.abs() >= FLOAT_EPSILON
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn eval(node: &Node, scope: &dyn EvalScope, rng: &mut RngManager) -> Result<f64, ExpressionError> {
    match node {
        Node::Number(value) => Ok(*value),

        Node::Reference(name) => {
            if name.eq_ignore_ascii_case("tnow") {
                return Ok(scope.now());
            }
            scope
                .variable(name)
                .or_else(|| scope.attribute(name))
                .ok_or_else(|| ExpressionError::UnknownReference(name.clone()))
        }

        Node::Negate(inner) => Ok(-eval(inner, scope, rng)?),

        Node::Not(inner) => Ok(flag(!truth(eval(inner, scope, rng)?))),

        // Short-circuit logical operators
        Node::Binary {
            op: BinOp::And,
            left,
            right,
        } => {
            if !truth(eval(left, scope, rng)?) {
                return Ok(0.0);
            }
            Ok(flag(truth(eval(right, scope, rng)?)))
        }

        Node::Binary {
            op: BinOp::Or,
            left,
            right,
        } => {
            if truth(eval(left, scope, rng)?) {
                return Ok(1.0);
            }
            Ok(flag(truth(eval(right, scope, rng)?)))
        }

        Node::Binary { op, left, right } => {
            let l = eval(left, scope, rng)?;
            let r = eval(right, scope, rng)?;
            arithmetic(*op, l, r)
        }

        Node::Call { name, args } => call(name, args, scope, rng),
    }
}

fn arithmetic(op: BinOp, l: f64, r: f64) -> Result<f64, ExpressionError> {
    Ok(match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r.abs() < f64::EPSILON {
                return Err(ExpressionError::DivisionByZero);
            }
            l / r
        }
        BinOp::Pow => l.powf(r),
        BinOp::Lt => flag(l < r),
        BinOp::Le => flag(l <= r || (l - r).abs() < FLOAT_EPSILON),
        BinOp::Gt => flag(l > r),
        BinOp::Ge => flag(l >= r || (l - r).abs() < FLOAT_EPSILON),
        BinOp::Eq => flag((l - r).abs() < FLOAT_EPSILON),
        BinOp::Ne => flag((l - r).abs() >= FLOAT_EPSILON),
        BinOp::And => flag(truth(l) && truth(r)),
        BinOp::Or => flag(truth(l) || truth(r)),
    })
}

fn call(
    name: &str,
    args: &[Node],
    scope: &dyn EvalScope,
    rng: &mut RngManager,
) -> Result<f64, ExpressionError> {
    if let ("nq" | "nr" | "mr", Some(Node::Reference(target))) = (name, args.first()) {
        let value = match name {
            "nq" => scope.queue_length(target),
            "nr" => scope.resource_busy(target),
            _ => scope.resource_capacity(target),
        };
        return value.ok_or_else(|| ExpressionError::UnknownReference(target.clone()));
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, scope, rng)?);
    }
    let invalid = |message: &str| ExpressionError::InvalidArgument {
        function: name.to_string(),
        message: message.to_string(),
    };

    match (name, values.as_slice()) {
        ("const", [x]) => Ok(*x),
        ("expo", [mean]) => {
            if *mean < 0.0 {
                return Err(invalid("mean must be non-negative"));
            }
            Ok(rng.exponential(*mean))
        }
        ("unif", [min, max]) => {
            if max < min {
                return Err(invalid("max must not be below min"));
            }
            Ok(rng.uniform(*min, *max))
        }
        ("tria", [min, mode, max]) => {
            if !(min <= mode && mode <= max) {
                return Err(invalid("expected min <= mode <= max"));
            }
            Ok(rng.triangular(*min, *mode, *max))
        }
        ("norm", [mean, sd]) => Ok(rng.normal(*mean, *sd)),
        ("erla", [mean, k]) => {
            if *k < 1.0 {
                return Err(invalid("k must be at least 1"));
            }
            Ok(rng.erlang(*mean, k.round() as u32))
        }
        ("logn", [mean, sd]) => Ok(rng.lognormal(*mean, *sd)),
        _ => Err(ExpressionError::UnknownFunction(name.to_string())),
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

/// Parses expressions once and caches the tree per source string
#[derive(Debug, Clone, Default)]
pub struct DefaultEvaluator {
    cache: HashMap<String, Node>,
}

impl DefaultEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct expressions parsed so far
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn compiled(&mut self, expression: &str) -> Result<&Node, ExpressionError> {
        if !self.cache.contains_key(expression) {
            let node = parse(expression)?;
            self.cache.insert(expression.to_string(), node);
        }
        self.cache
            .get(expression)
            .ok_or_else(|| ExpressionError::Parse {
                expression: expression.to_string(),
                message: "cache miss".to_string(),
            })
    }
}

impl ExpressionEvaluator for DefaultEvaluator {
    fn check(&mut self, expression: &str) -> Result<(), ExpressionError> {
        self.compiled(expression).map(|_| ())
    }

    fn evaluate(
        &mut self,
        expression: &str,
        scope: &dyn EvalScope,
        rng: &mut RngManager,
    ) -> Result<f64, ExpressionError> {
        let node = self.compiled(expression)?;
        eval(node, scope, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::EmptyScope;

    struct Fixture;

    impl EvalScope for Fixture {
        fn now(&self) -> f64 {
            12.0
        }
        fn queue_length(&self, queue: &str) -> Option<f64> {
            (queue == "Queue_1").then_some(3.0)
        }
        fn resource_busy(&self, resource: &str) -> Option<f64> {
            (resource == "M1").then_some(1.0)
        }
        fn resource_capacity(&self, resource: &str) -> Option<f64> {
            (resource == "M1").then_some(2.0)
        }
        fn variable(&self, name: &str) -> Option<f64> {
            (name == "limit").then_some(10.0)
        }
        fn attribute(&self, name: &str) -> Option<f64> {
            (name == "Entity.size").then_some(4.0)
        }
    }

    fn eval_str(expression: &str) -> Result<f64, ExpressionError> {
        let mut evaluator = DefaultEvaluator::new();
        let mut rng = RngManager::new(1);
        evaluator.evaluate(expression, &Fixture, &mut rng)
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval_str("1 + 2 * 3").unwrap(), 7.0);
        assert_eq!(eval_str("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(eval_str("-2 ^ 2").unwrap(), -4.0);
        assert_eq!(eval_str("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(eval_str("1.5e1 / 3").unwrap(), 5.0);
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval_str("3 > 2 and 1 <> 1").unwrap(), 0.0);
        assert_eq!(eval_str("3 > 2 or 1 <> 1").unwrap(), 1.0);
        assert_eq!(eval_str("not 0").unwrap(), 1.0);
        assert_eq!(eval_str("2 >= 2 AND 2 <= 2 AND 2 = 2").unwrap(), 1.0);
    }

    #[test]
    fn test_scope_references() {
        assert_eq!(eval_str("tnow").unwrap(), 12.0);
        assert_eq!(eval_str("NQ(Queue_1) + nr(M1) + MR(M1)").unwrap(), 6.0);
        assert_eq!(eval_str("limit - Entity.size").unwrap(), 6.0);
        assert_eq!(
            eval_str("missing"),
            Err(ExpressionError::UnknownReference("missing".to_string()))
        );
        assert_eq!(
            eval_str("NQ(Nope)"),
            Err(ExpressionError::UnknownReference("Nope".to_string()))
        );
    }

    #[test]
    fn test_distributions_stay_in_range() {
        let mut evaluator = DefaultEvaluator::new();
        let mut rng = RngManager::new(42);
        let scope = EmptyScope::default();
        for _ in 0..500 {
            let u = evaluator.evaluate("unif(0.7, 1.5)", &scope, &mut rng).unwrap();
            assert!((0.7..1.5).contains(&u));
            let e = evaluator.evaluate("expo(2)", &scope, &mut rng).unwrap();
            assert!(e >= 0.0);
            let t = evaluator.evaluate("TRIA(1, 2, 3)", &scope, &mut rng).unwrap();
            assert!((1.0..=3.0).contains(&t));
        }
        assert_eq!(evaluator.evaluate("const(4)", &scope, &mut rng).unwrap(), 4.0);
        assert_eq!(evaluator.cached(), 4);
    }

    #[test]
    fn test_check_reports_syntax_and_arity() {
        let mut evaluator = DefaultEvaluator::new();
        assert!(evaluator.check("expo(5)").is_ok());
        assert!(matches!(
            evaluator.check("expo(5"),
            Err(ExpressionError::Parse { .. })
        ));
        assert_eq!(
            evaluator.check("unif(1)"),
            Err(ExpressionError::Arity {
                function: "unif".to_string(),
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            evaluator.check("gamma(1, 2)"),
            Err(ExpressionError::UnknownFunction("gamma".to_string()))
        );
        assert!(evaluator.check("NQ(3)").is_err());
        assert!(evaluator.check("").is_err());
        assert!(evaluator.check("1 2").is_err());
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval_str("1 / 0"), Err(ExpressionError::DivisionByZero));
    }
}
