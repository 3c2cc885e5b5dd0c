//! error taxonomy
//!
//! - [ParseError]: a template string could not be parsed
//! - [StructuralError]: a `$merge`, `$forEach`, `$concat` or `$if` object is malformed
//! - [TemplateError]: evaluating a template failed, see [EvalErrorKind]
//! - [ContextError]: a lookup hit a context that refuses all lookups
//! - [SchemaError]: a context was constructed with fields it does not declare
use crate::collection::SourceInfo;
use crate::context::NotFound;
use crate::functions::FunctionError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Template(#[from] Box<TemplateError>),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Found unresolved template{} ({template}); resolve it before using it as plain data", at(.location))]
    Unresolved {
        template: String,
        location: Option<SourceInfo>,
    },
}

impl Error {
    /// The evaluation error kind, when this error stems from evaluating a template
    pub fn kind(&self) -> Option<&EvalErrorKind> {
        match self {
            Error::Template(template_error) => Some(&template_error.kind),
            _ => None,
        }
    }
}

fn at(location: &Option<SourceInfo>) -> String {
    match location {
        Some(location) => format!(" at {location}"),
        None => String::new(),
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Unable to parse as valid template string ({template}){}: {message}", at(.location))]
pub struct ParseError {
    /// template text, truncated for display
    pub template: String,
    pub message: String,
    pub location: Option<SourceInfo>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Invalid {operator} object{}: {message}", at(.location))]
pub struct StructuralError {
    /// `$merge`, `$forEach`, `$concat` or `$if`
    pub operator: &'static str,
    pub message: String,
    pub location: Option<SourceInfo>,
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("Invalid template string ({template}){}: {kind}", at(.location))]
pub struct TemplateError {
    /// template text, truncated for display
    pub template: String,
    pub location: Option<SourceInfo>,
    pub kind: EvalErrorKind,
}

/// Everything that can go wrong while evaluating a single template
#[derive(thiserror::Error, Debug, Clone)]
pub enum EvalErrorKind {
    #[error("{0}")]
    KeyNotFound(NotFound),
    #[error("{0}")]
    CircularReference(NotFound),
    #[error("{0}")]
    NotIndexable(NotFound),
    #[error("Expression in brackets must resolve to a string or number (got {type_name}).")]
    InvalidKey { type_name: &'static str },
    #[error("{0}")]
    Type(String),
    #[error(transparent)]
    Function(#[from] FunctionError),
}

impl From<NotFound> for EvalErrorKind {
    fn from(not_found: NotFound) -> Self {
        use crate::context::NotFoundReason;

        match not_found.reason {
            NotFoundReason::KeyNotFound => EvalErrorKind::KeyNotFound(not_found),
            NotFoundReason::CircularReference { .. } => {
                EvalErrorKind::CircularReference(not_found)
            }
            NotFoundReason::NotIndexable { .. } => EvalErrorKind::NotIndexable(not_found),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ContextError {
    pub message: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Context {context} has no field {field}. Declared fields: {declared}")]
    UnknownField {
        context: &'static str,
        field: String,
        declared: String,
    },
    #[error("Context {context} requires field {field}")]
    MissingField {
        context: &'static str,
        field: &'static str,
    },
}
