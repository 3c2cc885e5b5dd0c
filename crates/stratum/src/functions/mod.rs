//! helper functions
//!
//! Functions callable from templates, e.g. `${join(var.list, ",")}`. Each function declares its arguments;
//! arguments are checked against the declaration before the function is called. Helpers are pure: they only
//! transform their (already resolved) arguments.
mod collections;
mod encoding;
mod text;

use crate::util::natural_list;
use crate::value::Value;

/// Any argument type
pub const ANY: &[&str] = &["any"];

/// A declared argument of a [HelperFunction]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Argument {
    pub name: &'static str,
    /// accepted [Value::type_name]s, or [ANY]
    pub kinds: &'static [&'static str],
    pub required: bool,
}

impl Argument {
    const fn required(name: &'static str, kinds: &'static [&'static str]) -> Self {
        Self {
            name,
            kinds,
            required: true,
        }
    }

    const fn optional(name: &'static str, kinds: &'static [&'static str]) -> Self {
        Self {
            name,
            kinds,
            required: false,
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        self.kinds == ANY || self.kinds.contains(&value.type_name())
    }
}

pub type HelperResult = Result<Value, String>;

#[derive(Debug)]
pub struct HelperFunction {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: &'static [Argument],
    /// called with arguments matching the declaration
    pub call: fn(&[Value]) -> HelperResult,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    #[error("Could not find function {name}. Available functions: {available}")]
    UnknownFunction { name: String, available: String },
    #[error("Missing argument {argument} (position {index}) for function {function}()")]
    MissingArgument {
        function: &'static str,
        argument: &'static str,
        index: usize,
    },
    #[error("Argument {argument} (position {index}) of function {function}() must be {expected} (got {got})")]
    InvalidArgument {
        function: &'static str,
        argument: &'static str,
        index: usize,
        expected: String,
        got: &'static str,
    },
    #[error("Function {function}() takes at most {expected} argument(s) (got {got})")]
    TooManyArguments {
        function: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Error from helper function {function}: {message}")]
    Failed { function: &'static str, message: String },
}

const STRING: &[&str] = &["string"];
const NUMBER: &[&str] = &["number"];
const ARRAY: &[&str] = &["array"];
const STRING_OR_ARRAY: &[&str] = &["string", "array"];

/// All helper functions, sorted by name
pub static FUNCTIONS: &[HelperFunction] = &[
    HelperFunction {
        name: "base64Decode",
        description: "Decodes the given base64-encoded string.",
        arguments: &[Argument::required("string", STRING)],
        call: encoding::base64_decode,
    },
    HelperFunction {
        name: "base64Encode",
        description: "Encodes the given string as base64.",
        arguments: &[Argument::required("string", STRING)],
        call: encoding::base64_encode,
    },
    HelperFunction {
        name: "camelCase",
        description: "Converts the given string to camelCase.",
        arguments: &[Argument::required("string", STRING)],
        call: text::camel_case,
    },
    HelperFunction {
        name: "concat",
        description: "Concatenates two arrays or strings.",
        arguments: &[
            Argument::required("arg1", STRING_OR_ARRAY),
            Argument::required("arg2", STRING_OR_ARRAY),
        ],
        call: collections::concat,
    },
    HelperFunction {
        name: "indent",
        description: "Indents each line of the given string with the specified number of spaces.",
        arguments: &[
            Argument::required("string", STRING),
            Argument::required("spaces", NUMBER),
        ],
        call: text::indent,
    },
    HelperFunction {
        name: "isEmpty",
        description: "Returns true if the given value is an empty string, array or object, or null.",
        arguments: &[Argument::required("value", &["string", "array", "object", "null"])],
        call: collections::is_empty,
    },
    HelperFunction {
        name: "join",
        description: "Joins the items of an array with the given separator.",
        arguments: &[
            Argument::required("input", ARRAY),
            Argument::optional("separator", STRING),
        ],
        call: collections::join,
    },
    HelperFunction {
        name: "jsonDecode",
        description: "Decodes the given JSON string.",
        arguments: &[Argument::required("string", STRING)],
        call: encoding::json_decode,
    },
    HelperFunction {
        name: "jsonEncode",
        description: "Encodes the given value as JSON, indented by the given number of spaces if specified.",
        arguments: &[
            Argument::required("value", ANY),
            Argument::optional("spaces", NUMBER),
        ],
        call: encoding::json_encode,
    },
    HelperFunction {
        name: "kebabCase",
        description: "Converts the given string to kebab-case.",
        arguments: &[Argument::required("string", STRING)],
        call: text::kebab_case,
    },
    HelperFunction {
        name: "lower",
        description: "Converts the given string to lower case.",
        arguments: &[Argument::required("string", STRING)],
        call: text::lower,
    },
    HelperFunction {
        name: "replace",
        description: "Replaces all occurrences of a substring.",
        arguments: &[
            Argument::required("string", STRING),
            Argument::required("substring", STRING),
            Argument::required("replacement", STRING),
        ],
        call: text::replace,
    },
    HelperFunction {
        name: "sha256",
        description: "Creates a SHA256 hash of the given string, hex encoded.",
        arguments: &[Argument::required("string", STRING)],
        call: encoding::sha256,
    },
    HelperFunction {
        name: "slice",
        description: "Slices a string or array at the given indices. Negative indices count from the end.",
        arguments: &[
            Argument::required("input", STRING_OR_ARRAY),
            Argument::required("start", NUMBER),
            Argument::optional("end", NUMBER),
        ],
        call: collections::slice,
    },
    HelperFunction {
        name: "split",
        description: "Splits the given string by a separator.",
        arguments: &[
            Argument::required("string", STRING),
            Argument::required("separator", STRING),
        ],
        call: text::split,
    },
    HelperFunction {
        name: "string",
        description: "Converts the given value to a string.",
        arguments: &[Argument::required("value", ANY)],
        call: text::string,
    },
    HelperFunction {
        name: "trim",
        description: "Removes whitespace from both ends of the given string.",
        arguments: &[Argument::required("string", STRING)],
        call: text::trim,
    },
    HelperFunction {
        name: "upper",
        description: "Converts the given string to upper case.",
        arguments: &[Argument::required("string", STRING)],
        call: text::upper,
    },
    HelperFunction {
        name: "uuidv4",
        description: "Generates a random v4 UUID.",
        arguments: &[],
        call: encoding::uuid_v4,
    },
    HelperFunction {
        name: "yamlDecode",
        description: "Decodes the given YAML string.",
        arguments: &[Argument::required("string", STRING)],
        call: encoding::yaml_decode,
    },
    HelperFunction {
        name: "yamlEncode",
        description: "Encodes the given value as YAML.",
        arguments: &[Argument::required("value", ANY)],
        call: encoding::yaml_encode,
    },
];

pub fn get(name: &str) -> Option<&'static HelperFunction> {
    FUNCTIONS.iter().find(|function| function.name == name)
}

/// Check `args` against the declaration of `name` and call it
#[tracing::instrument(level = "trace", skip(args))]
pub fn call(name: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
    let Some(function) = get(name) else {
        let available: Vec<String> = FUNCTIONS.iter().map(|function| function.name.to_string()).collect();
        return Err(FunctionError::UnknownFunction {
            name: name.to_string(),
            available: natural_list(&available),
        });
    };

    if args.len() > function.arguments.len() {
        return Err(FunctionError::TooManyArguments {
            function: function.name,
            expected: function.arguments.len(),
            got: args.len(),
        });
    }

    for (index, argument) in function.arguments.iter().enumerate() {
        match args.get(index) {
            None if argument.required => {
                return Err(FunctionError::MissingArgument {
                    function: function.name,
                    argument: argument.name,
                    index,
                })
            }
            None => {}
            Some(value) if !argument.accepts(value) => {
                return Err(FunctionError::InvalidArgument {
                    function: function.name,
                    argument: argument.name,
                    index,
                    expected: argument.kinds.join(" or "),
                    got: value.type_name(),
                })
            }
            Some(_) => {}
        }
    }

    (function.call)(&args).map_err(|message| FunctionError::Failed {
        function: function.name,
        message,
    })
}

/// An integral number argument
fn integer(value: &Value, argument: &str) -> Result<i64, String> {
    value
        .as_i64()
        .ok_or_else(|| format!("{argument} must be an integer (got {})", value.to_template_string().unwrap_or_default()))
}
