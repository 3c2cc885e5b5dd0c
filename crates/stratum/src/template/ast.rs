//! Parsed representation of template strings
use crate::value::Value;

/// A fully parsed template string
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTemplate {
    /// the original text
    pub source: String,
    pub parts: Vec<TemplatePart>,
}

impl ParsedTemplate {
    /// A template consisting of exactly one `${...}` block (without `?` suffix)
    ///
    /// Such templates resolve to the native type of their expression instead of a string.
    pub fn single_expression(&self) -> Option<&Expr> {
        match self.parts.as_slice() {
            [TemplatePart::Expression {
                expr,
                optional: false,
                ..
            }] => Some(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Plain text between blocks
    Literal(String),
    /// `$${...}` - kept verbatim, unescaped on output unless configured otherwise
    Escaped(String),
    /// `${...}` with an optional `?` suffix
    Expression {
        expr: Expr,
        optional: bool,
        /// source text of the block, including the `?` suffix
        raw: String,
    },
    /// `${if ...}...${else}...${endif}`
    Conditional(Box<ConditionalBlock>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBlock {
    pub condition: Expr,
    pub then_branch: Vec<TemplatePart>,
    pub else_branch: Option<Vec<TemplatePart>>,
    /// source text from `${if ...}` up to and including `${endif}`
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Member {
        object: Box<Expr>,
        key: MemberKey,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Array(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKey {
    /// `.name`
    Name(String),
    /// `[expression]`
    Computed(Box<Expr>),
}

/// A member chain rooted at an identifier, e.g. `a.b[c].d`
///
/// These are resolved against the context as a single key path.
pub struct ContextPath<'a> {
    pub root: &'a str,
    pub keys: Vec<&'a MemberKey>,
}

impl Expr {
    /// Split `a.b[c]` into its root identifier and member keys
    ///
    /// Returns `None` for chains rooted in anything else (calls, literals, groups).
    pub fn as_context_path(&self) -> Option<ContextPath<'_>> {
        let mut keys = vec![];
        let mut current = self;

        loop {
            match current {
                Expr::Identifier(root) => {
                    keys.reverse();
                    return Some(ContextPath {
                        root: root.as_str(),
                        keys,
                    });
                }
                Expr::Member { object, key } => {
                    keys.push(key);
                    current = object.as_ref();
                }
                _ => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Contains,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Not => f.write_str("!"),
            UnaryOp::Negate => f.write_str("-"),
            UnaryOp::TypeOf => f.write_str("typeof"),
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Contains => "contains",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        })
    }
}

impl std::fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalOp::And => f.write_str("&&"),
            LogicalOp::Or => f.write_str("||"),
        }
    }
}
