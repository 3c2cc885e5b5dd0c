//! context model
//!
//! A [Context] answers "what is the value at key path K". Contexts are composed into a tree:
//!
//! | context            | lookup                                                          |
//! |--------------------|-----------------------------------------------------------------|
//! | [GenericContext]   | walks a [TemplateNode], evaluating templates it passes through   |
//! | [LayeredContext]   | asks each layer, later layers win, mappings are deep-merged      |
//! | [ErrorContext]     | always fails with a fixed message                                |
//! | [CapturedContext]  | delegates, but evaluates templates against a fixed root          |
//! | [ScopedContext]    | binds one name (`item`) on top of a parent                       |
//! | [ObjectContext]    | named fields, each a context, declared by a static schema        |
//! | [EnvContext]       | process environment variables, read once                         |
//!
//! Every lookup threads a [ResolutionStack] which detects circular references. Templates found during a
//! lookup are evaluated against [LookupRequest::root], which is the context the outermost evaluation started with.
mod cache;
mod captured;
mod env;
mod generic;
mod guard;
mod layered;
mod object;
mod project;
mod scoped;

pub use cache::ResolutionCache;
pub use captured::CapturedContext;
pub use env::EnvContext;
pub use generic::GenericContext;
pub use guard::ErrorContext;
pub use layered::LayeredContext;
pub use object::{FieldSchema, ObjectContext, ObjectContextBuilder};
pub use project::{project_context, ProjectContextParams, PROJECT_CONTEXT_FIELDS};
pub use scoped::ScopedContext;

use crate::error::Result;
use crate::evaluate::EvaluateOptions;
use crate::key_path::{render_key_path, KeyPath, PathSegment};
use crate::util::natural_list;
use crate::value::Value;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Weak};

pub trait Context: Debug + Send + Sync {
    /// Identity of this instance, used for circular reference detection and cache keys
    fn id(&self) -> &ContextId;

    /// Look up `request.key`; an empty key materializes the whole context
    fn resolve(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup>;
}

impl<C: Context + ?Sized> Context for Arc<C> {
    fn id(&self) -> &ContextId {
        self.as_ref().id()
    }

    fn resolve(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup> {
        self.as_ref().resolve(request, stack)
    }
}

/// Identity of a context instance
///
/// Two ids are equal only if one was cloned from the other. Caches hold a [WeakContextId] so an
/// identity can not be reused while anything still refers to it.
#[derive(Clone, Default)]
pub struct ContextId(Arc<()>);

impl ContextId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakContextId {
        WeakContextId(Arc::downgrade(&self.0))
    }
}

impl PartialEq for ContextId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ContextId {}

impl Debug for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContextId({:p})", Arc::as_ptr(&self.0))
    }
}

#[derive(Clone, Debug)]
pub struct WeakContextId(Weak<()>);

impl WeakContextId {
    pub fn is(&self, id: &ContextId) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&id.0))
    }

    /// The context this id belonged to has been dropped
    pub fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LookupRequest<'a> {
    /// remaining key path, relative to the context being asked
    pub key: &'a [PathSegment],
    /// path traversed by enclosing contexts, used in messages
    pub node_path: &'a [PathSegment],
    pub options: &'a EvaluateOptions,
    /// context templates are evaluated against
    pub root: &'a dyn Context,
}

impl<'a> LookupRequest<'a> {
    pub fn new(key: &'a [PathSegment], options: &'a EvaluateOptions, root: &'a dyn Context) -> Self {
        Self {
            key,
            node_path: &[],
            options,
            root,
        }
    }

    /// Full path of the requested key, as seen from the outermost context
    pub fn full_path(&self) -> KeyPath {
        self.node_path.iter().chain(self.key).cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub enum Lookup {
    Found(Value),
    NotFound(NotFound),
}

/// Explanation of a failed lookup
#[derive(Debug, Clone)]
pub struct NotFound {
    pub reason: NotFoundReason,
    /// the segment that could not be resolved
    pub key: String,
    /// path up to (excluding) `key`
    pub node_path: KeyPath,
    pub available_keys: AvailableKeys,
    /// the failing context asks for pass-through even without partial resolution
    pub always_partial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotFoundReason {
    KeyNotFound,
    CircularReference { cycle: Vec<String> },
    NotIndexable { type_name: &'static str },
}

impl NotFound {
    pub fn key_not_found(key: &PathSegment, node_path: KeyPath, available_keys: AvailableKeys) -> Self {
        Self {
            reason: NotFoundReason::KeyNotFound,
            key: key.to_string(),
            node_path,
            available_keys,
            always_partial: false,
        }
    }

    pub fn not_indexable(key: &PathSegment, node_path: KeyPath, type_name: &'static str) -> Self {
        Self {
            reason: NotFoundReason::NotIndexable { type_name },
            key: key.to_string(),
            node_path,
            available_keys: AvailableKeys::none(),
            always_partial: false,
        }
    }

    pub fn circular(request: &LookupRequest<'_>, cycle: Vec<String>) -> Self {
        Self {
            reason: NotFoundReason::CircularReference { cycle },
            key: render_key_path(request.key),
            node_path: request.node_path.to_vec(),
            available_keys: AvailableKeys::none(),
            always_partial: false,
        }
    }

    pub fn is_circular(&self) -> bool {
        matches!(self.reason, NotFoundReason::CircularReference { .. })
    }

    /// Number of segments that could be resolved before failing
    pub fn depth(&self) -> usize {
        self.node_path.len()
    }
}

impl Display for NotFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            NotFoundReason::KeyNotFound => {
                write!(f, "Could not find key {}", self.key)?;
                if !self.node_path.is_empty() {
                    write!(f, " under {}", render_key_path(&self.node_path))?;
                }
                f.write_str(".")?;

                let available = self.available_keys.get();
                if !available.is_empty() {
                    write!(f, " Available keys: {}.", natural_list(&available))?;
                }
                Ok(())
            }
            NotFoundReason::NotIndexable { type_name } => {
                write!(f, "Attempted to look up key {} on a {type_name}", self.key)?;
                if !self.node_path.is_empty() {
                    write!(f, " at {}", render_key_path(&self.node_path))?;
                }
                f.write_str(".")
            }
            NotFoundReason::CircularReference { cycle } => {
                let mut full_path = render_key_path(&self.node_path);
                if !full_path.is_empty() && !self.key.is_empty() {
                    full_path.push('.');
                }
                full_path.push_str(&self.key);
                write!(
                    f,
                    "Circular reference detected when resolving key {full_path} ({})",
                    cycle.join(" -> ")
                )
            }
        }
    }
}

type KeysThunk = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// Keys available where a lookup failed
///
/// Only computed when an error message is rendered.
#[derive(Clone, Default)]
pub struct AvailableKeys(Vec<KeysThunk>);

impl AvailableKeys {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn lazy(thunk: impl Fn() -> Vec<String> + Send + Sync + 'static) -> Self {
        Self(vec![Arc::new(thunk)])
    }

    pub fn merge(mut self, other: AvailableKeys) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Sorted and deduplicated
    pub fn get(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.0.iter().flat_map(|thunk| thunk()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl Debug for AvailableKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AvailableKeys({} sources)", self.0.len())
    }
}

/// Keys of the value found at `path` inside `value`
///
/// Used by lookups that captured a value for a lazy [AvailableKeys] listing.
pub(crate) fn value_keys(value: &Value, path: &[PathSegment]) -> Vec<String> {
    let mut current = value;
    for segment in path {
        let next = match current {
            Value::Object(object) => object.get(segment.as_key().as_ref()),
            Value::Array(array) => segment.as_index().and_then(|index| array.get(index)),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return vec![],
        }
    }

    match current {
        Value::Object(object) => object.keys().cloned().collect(),
        Value::Array(array) => (0..array.len()).map(|index| index.to_string()).collect(),
        _ => vec![],
    }
}

/// Walk the remaining `key` into an already resolved value
///
/// `node_path` is the path at which `value` was found.
pub(crate) fn lookup_in_value(
    value: Value,
    key: &[PathSegment],
    node_path: &[PathSegment],
    options: &EvaluateOptions,
) -> Lookup {
    let value = Arc::new(value);
    let mut current: &Value = &value;

    for (depth, segment) in key.iter().enumerate() {
        let traversed = || -> KeyPath { node_path.iter().chain(&key[..depth]).cloned().collect() };

        let next = match current {
            Value::Object(object) => object.get(segment.as_key().as_ref()),
            Value::Array(array) => segment.as_index().and_then(|index| array.get(index)),
            Value::String(text) if options.allow_partial && crate::template::is_template(text) => {
                // an unresolved template passed through, everything below it is unknown too
                return Lookup::NotFound(NotFound::key_not_found(segment, traversed(), AvailableKeys::none()));
            }
            primitive => {
                return Lookup::NotFound(NotFound::not_indexable(
                    segment,
                    traversed(),
                    primitive.type_name(),
                ))
            }
        };

        match next {
            Some(next) => current = next,
            None => {
                let captured = value.clone();
                let prefix = key[..depth].to_vec();
                return Lookup::NotFound(NotFound::key_not_found(
                    segment,
                    traversed(),
                    AvailableKeys::lazy(move || value_keys(&captured, &prefix)),
                ));
            }
        }
    }

    Lookup::Found(current.clone())
}

/// Per-resolution state threaded through every lookup
///
/// Tracks the `(context, key path)` pairs currently being resolved and how many template parts were
/// passed through unresolved (results containing those must not be cached).
#[derive(Debug, Default)]
pub struct ResolutionStack {
    frames: Vec<(ContextId, KeyPath)>,
    preserved: usize,
}

impl ResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `resolve` with `(context, path)` pushed onto the stack
    ///
    /// Returns the cycle (rendered paths) instead when the pair is already being resolved.
    pub fn with_frame<T>(
        &mut self,
        context: &ContextId,
        path: &[PathSegment],
        resolve: impl FnOnce(&mut Self) -> T,
    ) -> std::result::Result<T, Vec<String>> {
        if let Some(start) = self
            .frames
            .iter()
            .position(|(id, frame_path)| id == context && frame_path.as_slice() == path)
        {
            let mut cycle: Vec<String> = self.frames[start..]
                .iter()
                .map(|(_, frame_path)| render_key_path(frame_path))
                .collect();
            cycle.push(render_key_path(path));
            tracing::debug!(?cycle, "circular reference");
            return Err(cycle);
        }

        self.frames.push((context.clone(), path.to_vec()));
        let result = resolve(self);
        self.frames.pop();
        Ok(result)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Record that a template part was passed through unresolved
    pub fn preserve(&mut self) {
        self.preserved += 1;
    }

    pub fn preserved(&self) -> usize {
        self.preserved
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::key_path;
    use crate::value;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_compare_by_identity() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let weak = a.downgrade();
        assert!(weak.is(&a));
        assert!(!weak.is(&b));
        drop(a);
        assert!(weak.is_dead());
    }

    #[test]
    fn stack_detects_reentry() {
        let id = ContextId::new();
        let mut stack = ResolutionStack::new();

        let result = stack.with_frame(&id, &key_path!["a"], |stack| {
            stack.with_frame(&id, &key_path!["b"], |stack| {
                stack.with_frame(&id, &key_path!["a"], |_| ())
            })
        });

        assert_eq!(result, Ok(Ok(Err(vec!["a".into(), "b".into(), "a".into()]))));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn not_found_messages() {
        let not_found = NotFound::key_not_found(
            &"c".into(),
            key_path!["var"],
            AvailableKeys::lazy(|| vec!["b".into(), "a".into()]),
        );
        assert_eq!(
            not_found.to_string(),
            "Could not find key c under var. Available keys: a and b."
        );

        let not_found = NotFound::key_not_found(&"c".into(), vec![], AvailableKeys::none());
        assert_eq!(not_found.to_string(), "Could not find key c.");

        let not_found = NotFound::not_indexable(&"bar".into(), key_path!["foo"], "number");
        assert_eq!(
            not_found.to_string(),
            "Attempted to look up key bar on a number at foo."
        );
    }

    #[test]
    fn available_keys_merge_lazily() {
        let keys = AvailableKeys::lazy(|| vec!["b".into(), "a".into()])
            .merge(AvailableKeys::lazy(|| vec!["a".into(), "c".into()]));
        assert_eq!(keys.get(), vec!["a", "b", "c"]);
    }

    #[test]
    fn lookup_in_resolved_value() {
        let options = EvaluateOptions::default();
        let value = value!({ "a": { "b": [10, 20] } });

        let Lookup::Found(found) =
            lookup_in_value(value.clone(), &key_path!["a", "b", 1usize], &[], &options)
        else {
            panic!("must be found");
        };
        assert_eq!(found, Value::Integer(20));

        let Lookup::NotFound(not_found) =
            lookup_in_value(value, &key_path!["a", "x"], &key_path!["var"], &options)
        else {
            panic!("must not be found");
        };
        assert_eq!(
            not_found.to_string(),
            "Could not find key x under var.a. Available keys: b."
        );
    }
}
