//! # stratum - layered configuration templates
//!
//! For CLI usage see the `stratum` binary (`stratum --help`).
//!
//! ## Introduction for developers
//!
//! Read this to understand how `stratum` works internally.
//!
//! ### Template strings
//!
//! Any string value containing `${` is a template string. It is parsed ([template::parse_template]) into parts:
//!
//! - plain text
//! - `${expression}` blocks, optionally suffixed with `?`
//! - `$${...}` escapes, which are output as `${...}`
//! - `${if expression}...${else}...${endif}` blocks
//!
//! ```text
//! image: ${var.registry}/${kebabCase(project.name)}:${var.tag || "latest"}
//! debug: ${if environment.name == "dev"}true${else}false${endif}
//! ```
//!
//! A template string consisting of a single `${...}` block resolves to the native type of its expression
//! (`${var.replicas}` can be a number, `${var.list}` a list). Anything else renders to a string.
//!
//! ### Template collections
//!
//! Configuration is plain data (as loaded from YAML or JSON). [collection::parse_template_collection] turns it into a
//! tree of [collection::TemplateNode]s, recognizing the structural operators:
//!
//! | **operator**                      | **effect**                                              |
//! |-----------------------------------|---------------------------------------------------------|
//! | `$merge: <mapping>`               | merges the mapping into the enclosing one, in order     |
//! | `- $concat: <list>`               | splices the list into the enclosing list                |
//! | `$forEach`, `$filter`, `$return`  | maps a list or mapping, `item.key` and `item.value` set |
//! | `$if`, `$then`, `$else`           | selects a branch by a boolean                           |
//!
//! Malformed operators are rejected at this point, before anything is evaluated.
//!
//! ### Contexts
//!
//! Templates are evaluated against a [context::Context]: a tree that answers lookups by key path. Contexts are
//! composed: a [context::LayeredContext] stacks variable files, an [context::ObjectContext] mounts contexts under
//! names, and so on. [context::project_context] builds the standard root (`project`, `environment`, `local`, `var`,
//! `secrets`, `runtime` and `actions`).
//!
//! Values inside contexts may be templates themselves. They are evaluated lazily, when a lookup passes through them,
//! and their results are cached. A lookup that is already in progress further up the stack is reported as a circular
//! reference instead of recursing forever.
//!
//! ### Evaluation
//!
//! [evaluate::evaluate] reduces a template tree to a [value::Value]. By default every missing key is an error that
//! names the key and lists the keys available at that point. With [evaluate::EvaluateOptions::allow_partial] the
//! template text is kept instead, so the result can be resolved again once more is known.
//!
//! ### References
//!
//! [references::get_context_lookup_references] lists the key paths a tree reads without evaluating it, skipping
//! branches that conditions already rule out. [references::get_action_references] builds on it to find the actions
//! (`${actions.<kind>.<name>...}`) a configuration depends on.
//!
pub mod collection;
pub mod context;
pub mod error;
pub mod evaluate;
pub mod functions;
pub mod key_path;
pub mod references;
pub mod template;
mod util;
pub mod value;
mod visit;

pub use collection::{parse_template_collection, SourceInfo, TemplateNode};
pub use error::{Error, Result};
pub use evaluate::{evaluate, evaluate_with_inputs, resolve_template_string, EvaluateOptions, Resolved};
pub use value::Value;

#[doc(hidden)]
pub use serde_json as __serde_json;
