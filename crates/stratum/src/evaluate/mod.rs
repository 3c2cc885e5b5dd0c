//! evaluation
//!
//! [evaluate] reduces a [TemplateNode] tree to plain data. Templates are evaluated against a root [Context];
//! structural operators are reduced after their operands (see `structural.rs`).
//!
//! Missing keys are not errors right away. Expressions evaluate to [Evaluated::Missing] so that `&&`, `||` and
//! the `?` suffix can recover. Only once a missing value reaches the template level it either fails the
//! evaluation, or (partial resolution, always-partial contexts) leaves the template text in place.
mod operators;
mod structural;

pub(crate) use structural::ITEM_NAME;

use crate::collection::{parse_template_collection, SourceInfo, TemplateNode, UnresolvedTemplate};
use crate::context::{
    lookup_in_value, Context, Lookup, LookupRequest, NotFound, NotFoundReason, ResolutionStack,
};
use crate::error::{Error, EvalErrorKind, Result, TemplateError};
use crate::functions;
use crate::key_path::{KeyPath, PathSegment};
use crate::template::ast::{ConditionalBlock, ContextPath, Expr, LogicalOp, MemberKey, TemplatePart};
use crate::util::display_template;
use crate::value::Value;
use indexmap::IndexSet;

/// Knobs of a single evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateOptions {
    /// keep templates referencing missing keys as they are instead of failing
    pub allow_partial: bool,
    /// output `$${...}` as `${...}`
    pub unescape: bool,
    /// location of the evaluated value, used in error messages
    pub source: Option<SourceInfo>,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            allow_partial: false,
            unescape: true,
            source: None,
        }
    }
}

impl EvaluateOptions {
    pub fn partial() -> Self {
        Self {
            allow_partial: true,
            ..Default::default()
        }
    }
}

/// Result of [evaluate_with_inputs]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// `None` when the tree resolved to nothing (e.g. `${missing}?`)
    pub value: Option<Value>,
    /// every context key path read by the tree's templates
    pub inputs: IndexSet<KeyPath>,
}

/// Evaluate a template tree against `context`
pub fn evaluate(
    node: &TemplateNode,
    context: &dyn Context,
    options: &EvaluateOptions,
) -> Result<Option<Value>> {
    evaluate_with_inputs(node, context, options).map(|resolved| resolved.value)
}

/// Evaluate a template tree, also reporting the context key paths it read
#[tracing::instrument(level = "debug", skip_all, fields(allow_partial = options.allow_partial))]
pub fn evaluate_with_inputs(
    node: &TemplateNode,
    context: &dyn Context,
    options: &EvaluateOptions,
) -> Result<Resolved> {
    let mut stack = ResolutionStack::new();
    let mut evaluator = Evaluator::new(context, options);
    let value = evaluator.node(node, &mut stack)?;

    Ok(Resolved {
        value,
        inputs: evaluator.inputs,
    })
}

/// Parse and evaluate a single string
///
/// Strings without `${` are returned unchanged.
pub fn resolve_template_string(
    text: &str,
    context: &dyn Context,
    options: &EvaluateOptions,
) -> Result<Option<Value>> {
    let source = options.source.clone().unwrap_or_default();
    let node = parse_template_collection(Value::from(text), &source)?;
    evaluate(&node, context, options)
}

/// Evaluate a node found inside a context during a lookup
pub(crate) fn evaluate_node(
    node: &TemplateNode,
    root: &dyn Context,
    options: &EvaluateOptions,
    stack: &mut ResolutionStack,
) -> Result<Option<Value>> {
    Evaluator::new(root, options).node(node, stack)
}

/// Outcome of evaluating an expression
#[derive(Debug)]
pub(crate) enum Evaluated {
    Value(Value),
    Missing(NotFound),
}

/// Why an expression could not be evaluated
#[derive(Debug)]
pub(crate) enum Failure {
    /// fails the template being evaluated
    Kind(EvalErrorKind),
    /// already describes its own location, e.g. a nested template failed
    Error(Error),
}

impl From<EvalErrorKind> for Failure {
    fn from(kind: EvalErrorKind) -> Self {
        Failure::Kind(kind)
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Failure::Error(error)
    }
}

impl Failure {
    pub(crate) fn into_error(self, template: &str, location: &SourceInfo) -> Error {
        match self {
            Failure::Kind(kind) => Error::Template(Box::new(TemplateError {
                template: display_template(template),
                location: (!location.is_empty()).then(|| location.clone()),
                kind,
            })),
            Failure::Error(error) => error,
        }
    }
}

/// Continue with the value, or return early when it is missing
macro_rules! try_value {
    ($evaluated:expr) => {
        match $evaluated {
            Evaluated::Value(value) => value,
            Evaluated::Missing(not_found) => return Ok(Evaluated::Missing(not_found)),
        }
    };
}

pub(crate) struct Evaluator<'a> {
    root: &'a dyn Context,
    options: &'a EvaluateOptions,
    pub(crate) inputs: IndexSet<KeyPath>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(root: &'a dyn Context, options: &'a EvaluateOptions) -> Self {
        Self {
            root,
            options,
            inputs: IndexSet::new(),
        }
    }

    pub(crate) fn node(
        &mut self,
        node: &TemplateNode,
        stack: &mut ResolutionStack,
    ) -> Result<Option<Value>> {
        match node {
            TemplateNode::Literal(value) => Ok(Some(value.clone())),
            TemplateNode::Template(template) => self.template(template, stack),
            TemplateNode::Mapping(entries) => self.mapping(entries, stack),
            TemplateNode::List(items) => self.list(items, stack),
            TemplateNode::Concat(_) => self.list(std::slice::from_ref(node), stack),
            TemplateNode::ForEach(for_each) => self.for_each(for_each, stack),
            TemplateNode::If(if_node) => self.if_node(if_node, stack),
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(template = %template.text))]
    fn template(
        &mut self,
        template: &UnresolvedTemplate,
        stack: &mut ResolutionStack,
    ) -> Result<Option<Value>> {
        let root_id = self.root.id();
        if let Some(cached) = template.cached(root_id, self.options.unescape) {
            tracing::trace!("cache hit");
            self.inputs.extend(cached.inputs);
            return Ok(cached.value);
        }

        let preserved = stack.preserved();
        let mut inner = Evaluator::new(self.root, self.options);
        let value = inner
            .render(&template.parsed.parts, stack)
            .map_err(|failure| failure.into_error(&template.text, &template.source))?;

        if stack.preserved() == preserved {
            template.store(
                root_id,
                self.options.unescape,
                value.clone(),
                inner.inputs.clone(),
            );
        }
        self.inputs.extend(inner.inputs);

        Ok(value)
    }

    fn passes_through(&self, not_found: &NotFound) -> bool {
        self.options.allow_partial || not_found.always_partial
    }

    /// Render template parts
    ///
    /// A single `${...}` block keeps the native type of its value, anything else renders to a string.
    pub(crate) fn render(
        &mut self,
        parts: &[TemplatePart],
        stack: &mut ResolutionStack,
    ) -> std::result::Result<Option<Value>, Failure> {
        match parts {
            [TemplatePart::Expression {
                expr,
                optional: false,
                raw,
            }] => {
                return match self.expr(expr, stack)? {
                    Evaluated::Value(value) => Ok(Some(value)),
                    Evaluated::Missing(not_found) if self.passes_through(&not_found) => {
                        stack.preserve();
                        Ok(Some(Value::String(raw.clone())))
                    }
                    Evaluated::Missing(not_found) => Err(EvalErrorKind::from(not_found).into()),
                };
            }
            [TemplatePart::Expression {
                expr,
                optional: true,
                raw,
            }] => {
                return match self.expr(expr, stack)? {
                    // the value is there, so `?` is just text
                    Evaluated::Value(value) => Ok(Some(Value::String(interpolate(&value, raw)? + "?"))),
                    Evaluated::Missing(not_found) if self.passes_through(&not_found) => {
                        stack.preserve();
                        Ok(Some(Value::String(raw.clone())))
                    }
                    Evaluated::Missing(not_found) => {
                        tracing::trace!(%not_found, "optional value missing");
                        Ok(None)
                    }
                };
            }
            [TemplatePart::Conditional(block)] => {
                return match self.condition(block, stack)? {
                    Some(branch) => self.render(branch, stack),
                    None => {
                        stack.preserve();
                        Ok(Some(Value::String(block.raw.clone())))
                    }
                };
            }
            _ => {}
        }

        let mut rendered = String::new();
        self.render_into(parts, &mut rendered, stack)?;
        Ok(Some(Value::String(rendered)))
    }

    fn render_into(
        &mut self,
        parts: &[TemplatePart],
        rendered: &mut String,
        stack: &mut ResolutionStack,
    ) -> std::result::Result<(), Failure> {
        for part in parts {
            match part {
                TemplatePart::Literal(text) => rendered.push_str(text),
                TemplatePart::Escaped(raw) => match raw.strip_prefix('$') {
                    Some(unescaped) if self.options.unescape => rendered.push_str(unescaped),
                    _ => rendered.push_str(raw),
                },
                TemplatePart::Expression {
                    expr,
                    optional,
                    raw,
                } => match self.expr(expr, stack)? {
                    Evaluated::Value(value) => {
                        rendered.push_str(&interpolate(&value, raw)?);
                        if *optional {
                            rendered.push('?');
                        }
                    }
                    Evaluated::Missing(not_found) if self.passes_through(&not_found) => {
                        stack.preserve();
                        rendered.push_str(raw);
                    }
                    // an optional block renders as nothing
                    Evaluated::Missing(_) if *optional => {}
                    Evaluated::Missing(not_found) => return Err(EvalErrorKind::from(not_found).into()),
                },
                TemplatePart::Conditional(block) => match self.condition(block, stack)? {
                    Some(branch) => self.render_into(branch, rendered, stack)?,
                    None => {
                        stack.preserve();
                        rendered.push_str(&block.raw);
                    }
                },
            }
        }

        Ok(())
    }

    /// The branch selected by a `${if}` block, `None` when it has to be passed through
    fn condition<'b>(
        &mut self,
        block: &'b ConditionalBlock,
        stack: &mut ResolutionStack,
    ) -> std::result::Result<Option<&'b [TemplatePart]>, Failure> {
        match self.expr(&block.condition, stack)? {
            Evaluated::Value(value) if value.is_truthy() => Ok(Some(&block.then_branch)),
            Evaluated::Value(_) => Ok(Some(block.else_branch.as_deref().unwrap_or(&[]))),
            Evaluated::Missing(not_found) if self.passes_through(&not_found) => Ok(None),
            Evaluated::Missing(not_found) => Err(EvalErrorKind::from(not_found).into()),
        }
    }

    pub(crate) fn expr(
        &mut self,
        expr: &Expr,
        stack: &mut ResolutionStack,
    ) -> std::result::Result<Evaluated, Failure> {
        match expr {
            Expr::Literal(value) => Ok(Evaluated::Value(value.clone())),
            Expr::Identifier(name) => self.lookup(vec![PathSegment::Key(name.clone())], stack),
            Expr::Member { object, key } => match expr.as_context_path() {
                Some(path) => self.context_path(&path, stack),
                None => {
                    let object = try_value!(self.expr(object, stack)?);
                    let segment = try_value!(self.member_key(key, stack)?);
                    let segment = to_segment(segment)?;
                    match lookup_in_value(object, std::slice::from_ref(&segment), &[], self.options) {
                        Lookup::Found(value) => Ok(Evaluated::Value(value)),
                        Lookup::NotFound(not_found) => missing_or_failure(not_found),
                    }
                }
            },
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(try_value!(self.expr(arg, stack)?));
                }
                let value = functions::call(name, values).map_err(EvalErrorKind::from)?;
                Ok(Evaluated::Value(value))
            }
            Expr::Unary { op, operand } => {
                let operand = try_value!(self.expr(operand, stack)?);
                Ok(Evaluated::Value(operators::unary(*op, operand)?))
            }
            Expr::Binary { op, left, right } => {
                let left = try_value!(self.expr(left, stack)?);
                let right = try_value!(self.expr(right, stack)?);
                Ok(Evaluated::Value(operators::binary(*op, left, right)?))
            }
            Expr::Logical {
                op: LogicalOp::And,
                left,
                right,
            } => {
                // a missing operand makes the whole expression false
                let left = match self.expr(left, stack)? {
                    Evaluated::Value(value) => value,
                    Evaluated::Missing(_) => return Ok(Evaluated::Value(Value::Boolean(false))),
                };
                if !left.is_truthy() {
                    return Ok(Evaluated::Value(left));
                }
                match self.expr(right, stack)? {
                    Evaluated::Missing(_) => Ok(Evaluated::Value(Value::Boolean(false))),
                    right => Ok(right),
                }
            }
            Expr::Logical {
                op: LogicalOp::Or,
                left,
                right,
            } => match self.expr(left, stack)? {
                Evaluated::Value(value) if value.is_truthy() => Ok(Evaluated::Value(value)),
                _ => self.expr(right, stack),
            },
            Expr::Ternary {
                condition,
                consequent,
                alternate,
            } => {
                let condition = try_value!(self.expr(condition, stack)?);
                if condition.is_truthy() {
                    self.expr(consequent, stack)
                } else {
                    self.expr(alternate, stack)
                }
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(try_value!(self.expr(item, stack)?));
                }
                Ok(Evaluated::Value(Value::Array(values)))
            }
        }
    }

    /// Value of a member key: the name itself, or the evaluated bracket expression
    pub(crate) fn member_key(
        &mut self,
        key: &MemberKey,
        stack: &mut ResolutionStack,
    ) -> std::result::Result<Evaluated, Failure> {
        match key {
            MemberKey::Name(name) => Ok(Evaluated::Value(Value::from(name.as_str()))),
            MemberKey::Computed(expr) => self.expr(expr, stack),
        }
    }

    fn context_path(
        &mut self,
        path: &ContextPath<'_>,
        stack: &mut ResolutionStack,
    ) -> std::result::Result<Evaluated, Failure> {
        let mut key_path = vec![PathSegment::Key(path.root.to_string())];
        for key in &path.keys {
            let segment = try_value!(self.member_key(key, stack)?);
            key_path.push(to_segment(segment)?);
        }

        self.lookup(key_path, stack)
    }

    fn lookup(
        &mut self,
        key_path: KeyPath,
        stack: &mut ResolutionStack,
    ) -> std::result::Result<Evaluated, Failure> {
        let request = LookupRequest::new(&key_path, self.options, self.root);

        match self.root.resolve(&request, stack)? {
            Lookup::Found(value) => {
                self.inputs.insert(key_path);
                Ok(Evaluated::Value(value))
            }
            Lookup::NotFound(not_found) => missing_or_failure(not_found),
        }
    }
}

/// Only a missing key can be recovered from
fn missing_or_failure(not_found: NotFound) -> std::result::Result<Evaluated, Failure> {
    match not_found.reason {
        NotFoundReason::KeyNotFound => Ok(Evaluated::Missing(not_found)),
        _ => Err(EvalErrorKind::from(not_found).into()),
    }
}

/// Bracket keys must be strings or numbers
pub(crate) fn to_segment(key: Value) -> std::result::Result<PathSegment, Failure> {
    match key {
        Value::String(key) => Ok(PathSegment::Key(key)),
        Value::Integer(index) if index >= 0 => Ok(PathSegment::Index(index as usize)),
        number @ (Value::Integer(_) | Value::Decimal(_)) => match number.as_i64() {
            Some(index) if index >= 0 => Ok(PathSegment::Index(index as usize)),
            _ => Ok(PathSegment::Key(number.to_template_string().unwrap_or_default())),
        },
        other => Err(EvalErrorKind::InvalidKey {
            type_name: other.type_name(),
        }
        .into()),
    }
}

fn interpolate(value: &Value, raw: &str) -> std::result::Result<String, Failure> {
    value.to_template_string().ok_or_else(|| {
        EvalErrorKind::Type(format!(
            "Cannot interpolate a value of type {} ({raw}) into a string. Use jsonEncode() to render it.",
            value.type_name()
        ))
        .into()
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::GenericContext;
    use crate::value;
    use pretty_assertions::assert_eq;

    fn context(data: Value) -> GenericContext {
        GenericContext::from_value(data, &SourceInfo::default()).unwrap()
    }

    fn resolve(text: &str, data: Value) -> Option<Value> {
        resolve_template_string(text, &context(data), &EvaluateOptions::default()).unwrap()
    }

    fn resolve_err(text: &str, data: Value) -> String {
        resolve_template_string(text, &context(data), &EvaluateOptions::default())
            .unwrap_err()
            .to_string()
    }

    fn resolve_partial(text: &str, data: Value) -> Option<Value> {
        resolve_template_string(text, &context(data), &EvaluateOptions::partial()).unwrap()
    }

    #[test]
    fn plain_strings_are_unchanged() {
        assert_eq!(resolve("no templates here", value!({})), Some("no templates here".into()));
    }

    #[test]
    fn single_expressions_keep_their_type() {
        assert_eq!(resolve("${123}", value!({})), Some(Value::Integer(123)));
        assert_eq!(resolve("${true}", value!({})), Some(Value::Boolean(true)));
        assert_eq!(resolve("${null}", value!({})), Some(Value::Null));
        assert_eq!(resolve("${a}", value!({ "a": [1, 2] })), Some(value!([1, 2])));
    }

    #[test]
    fn multi_part_templates_render_strings() {
        assert_eq!(
            resolve("${a}-${b}-${c}", value!({ "a": 1, "b": null, "c": true })),
            Some("1-null-true".into())
        );
        assert_eq!(
            resolve_err("x ${a}", value!({ "a": { "b": 1 } })),
            "Invalid template string (x ${a}): Cannot interpolate a value of type object (${a}) into a string. Use jsonEncode() to render it."
        );
    }

    #[test]
    fn escapes() {
        assert_eq!(resolve("$${a}", value!({})), Some("${a}".into()));

        let options = EvaluateOptions {
            unescape: false,
            ..Default::default()
        };
        let kept = resolve_template_string("$${a} ${b}", &context(value!({ "b": 1 })), &options).unwrap();
        assert_eq!(kept, Some("$${a} 1".into()));
    }

    #[test]
    fn short_circuiting_does_not_look_up_keys() {
        assert_eq!(resolve("${false && a}", value!({})), Some(Value::Boolean(false)));
        assert_eq!(resolve("${true || a}", value!({})), Some(Value::Boolean(true)));
        assert_eq!(resolve("${true ? 1 : a}", value!({})), Some(Value::Integer(1)));
        assert_eq!(resolve("${a || 'fallback'}", value!({})), Some("fallback".into()));
    }

    #[test]
    fn and_with_missing_operand_is_false() {
        assert_eq!(
            resolve("${var.foo && 'a'}", value!({ "var": {} })),
            Some(Value::Boolean(false))
        );
        assert_eq!(resolve("${true && a}", value!({})), Some(Value::Boolean(false)));
    }

    #[test]
    fn optional_suffix() {
        assert_eq!(resolve("${a}?", value!({})), None);
        assert_eq!(resolve("${a}?", value!({ "a": "x" })), Some("x?".into()));
        assert_eq!(resolve("pre-${a}?", value!({})), Some("pre-".into()));
    }

    #[test]
    fn missing_keys_list_available_keys() {
        assert_eq!(
            resolve_err("${var.c}", value!({ "var": { "b": 1, "a": 2 } })),
            "Invalid template string (${var.c}): Could not find key c under var. Available keys: a and b."
        );
    }

    #[test]
    fn partial_resolution_keeps_template_text() {
        assert_eq!(resolve_partial("${a}", value!({})), Some("${a}".into()));
        assert_eq!(
            resolve_partial("${a} and ${b}", value!({ "b": 2 })),
            Some("${a} and 2".into())
        );
        assert_eq!(resolve_partial("${a}?", value!({})), Some("${a}?".into()));
        assert_eq!(
            resolve_partial("${if a}yes${endif}", value!({})),
            Some("${if a}yes${endif}".into())
        );
    }

    #[test]
    fn conditional_blocks() {
        let data = value!({ "on": true, "off": 0, "name": "x" });
        assert_eq!(
            resolve("${if on}a${else}b${endif}-${if off}a${else}b${endif}", data.clone()),
            Some("a-b".into())
        );
        assert_eq!(resolve("${if on}${name}${endif}", data.clone()), Some("x".into()));
        assert_eq!(resolve("${if off}${name}${endif}", data), Some("".into()));
    }

    #[test]
    fn bracket_access() {
        let data = value!({ "a": { "b-c": 1, "list": [10, 20] }, "key": "b-c", "i": 1 });
        assert_eq!(resolve("${a[key]}", data.clone()), Some(Value::Integer(1)));
        assert_eq!(resolve("${a.list[i]}", data.clone()), Some(Value::Integer(20)));
        assert_eq!(resolve("${a['list'][0]}", data.clone()), Some(Value::Integer(10)));
        assert_eq!(resolve("${[1, 2][1]}", data.clone()), Some(Value::Integer(2)));
        assert_eq!(resolve("${a[${key}]}", data.clone()), Some(Value::Integer(1)));
        assert_eq!(resolve("${a.list[${i}]}", data.clone()), Some(Value::Integer(20)));
        assert_eq!(
            resolve_err("${a[a]}", data),
            "Invalid template string (${a[a]}): Expression in brackets must resolve to a string or number (got object)."
        );
    }

    #[test]
    fn indexing_a_primitive_fails() {
        assert_eq!(
            resolve_err("${foo[bar]}", value!({ "foo": 123, "bar": "baz" })),
            "Invalid template string (${foo[bar]}): Attempted to look up key baz on a number at foo."
        );
    }

    #[test]
    fn functions_are_called() {
        assert_eq!(
            resolve("${join(split('a,b', ','), '-')}", value!({})),
            Some("a-b".into())
        );
        assert!(resolve_err("${nope()}", value!({}))
            .starts_with("Invalid template string (${nope()}): Could not find function nope. Available functions: "));
    }

    #[test]
    fn inputs_are_tracked() {
        let node = parse_template_collection(
            value!({ "a": "${x.y}", "b": ["${z}", "${x.y}"], "c": "${false && w}" }),
            &SourceInfo::default(),
        )
        .unwrap();

        let resolved = evaluate_with_inputs(
            &node,
            &context(value!({ "x": { "y": 1 }, "z": 2 })),
            &EvaluateOptions::default(),
        )
        .unwrap();

        assert_eq!(resolved.value, Some(value!({ "a": 1, "b": [2, 1], "c": false })));
        assert_eq!(
            resolved.inputs.into_iter().collect::<Vec<_>>(),
            vec![crate::key_path!["x", "y"], crate::key_path!["z"]]
        );
    }
}
