//! static reference analysis
//!
//! [get_context_lookup_references] lists the context key paths a template tree would read, without evaluating
//! the tree. Conditions that can already be resolved against the given context prune the branches evaluation
//! would not take (`&&`, `||`, `? :`, `${if}` blocks and `$if` objects), so the analysis agrees with evaluation
//! about what is reachable.
//!
//! Key paths with bracket expressions that can not be resolved yet are reported as
//! [ReferenceKind::Unresolvable], with the path up to the bracket.
mod actions;

pub use actions::{get_action_references, ActionKind, ActionReference, ActionReferenceError};

use crate::collection::{MappingEntry, SourceInfo, TemplateNode, UnresolvedTemplate};
use crate::context::{Context, ResolutionStack};
use crate::error::{Error, EvalErrorKind};
use crate::evaluate::{to_segment, EvaluateOptions, Evaluated, Evaluator, ITEM_NAME};
use crate::key_path::{KeyPath, PathSegment};
use crate::template::ast::{Expr, LogicalOp, MemberKey, TemplatePart};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ReferenceKind {
    Resolvable,
    /// a bracket expression in the path failed to resolve, `key_path` ends before it
    Unresolvable(Arc<Error>),
}

#[derive(Debug, Clone)]
pub struct ContextLookupReference {
    pub key_path: KeyPath,
    pub kind: ReferenceKind,
    /// location of the template containing the reference
    pub source: SourceInfo,
    pub template: String,
}

impl ContextLookupReference {
    pub fn is_resolvable(&self) -> bool {
        matches!(self.kind, ReferenceKind::Resolvable)
    }

    /// First segment of the key path, e.g. `var` or `secrets`
    pub fn root(&self) -> Option<&str> {
        match self.key_path.first() {
            Some(PathSegment::Key(root)) => Some(root),
            _ => None,
        }
    }
}

/// Pending work of [ContextLookupReferences]
///
/// `scoped` is set inside `$forEach` bodies and filters, where `item` is bound.
enum Work<'a> {
    Node {
        node: &'a TemplateNode,
        scoped: bool,
    },
    Parts {
        parts: &'a [TemplatePart],
        template: &'a UnresolvedTemplate,
        scoped: bool,
    },
    Expr {
        expr: &'a Expr,
        template: &'a UnresolvedTemplate,
        scoped: bool,
    },
}

/// Lazily yields the references of a template tree, in declaration order
pub struct ContextLookupReferences<'a> {
    context: &'a dyn Context,
    options: EvaluateOptions,
    work: Vec<Work<'a>>,
    ready: VecDeque<ContextLookupReference>,
}

/// List the context key paths `node` references
///
/// `context` is only used to resolve conditions and bracket expressions.
pub fn get_context_lookup_references<'a>(
    node: &'a TemplateNode,
    context: &'a dyn Context,
) -> ContextLookupReferences<'a> {
    ContextLookupReferences {
        context,
        options: EvaluateOptions::default(),
        work: vec![Work::Node {
            node,
            scoped: false,
        }],
        ready: VecDeque::new(),
    }
}

/// Secret references, e.g. `${secrets.api-token}`
pub fn get_secret_references<'a>(
    node: &'a TemplateNode,
    context: &'a dyn Context,
) -> impl Iterator<Item = ContextLookupReference> + 'a {
    get_context_lookup_references(node, context).filter(|reference| reference.root() == Some("secrets"))
}

/// Whether `expr` refers to `name` anywhere
fn mentions(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Literal(_) => false,
        Expr::Identifier(identifier) => identifier == name,
        Expr::Member { object, key } => {
            mentions(object, name) || matches!(key, MemberKey::Computed(key) if mentions(key, name))
        }
        Expr::Call { args, .. } | Expr::Array(args) => args.iter().any(|arg| mentions(arg, name)),
        Expr::Unary { operand, .. } => mentions(operand, name),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            mentions(left, name) || mentions(right, name)
        }
        Expr::Ternary {
            condition,
            consequent,
            alternate,
        } => mentions(condition, name) || mentions(consequent, name) || mentions(alternate, name),
    }
}

impl<'a> ContextLookupReferences<'a> {
    /// Evaluate `expr` now, `None` if it depends on `item` or fails
    fn evaluate(&self, expr: &Expr, scoped: bool) -> Option<Evaluated> {
        if scoped && mentions(expr, ITEM_NAME) {
            return None;
        }

        let mut evaluator = Evaluator::new(self.context, &self.options);
        evaluator.expr(expr, &mut ResolutionStack::new()).ok()
    }

    /// Truthiness of `expr`, if it can be resolved now
    fn condition(&self, expr: &Expr, scoped: bool) -> Option<bool> {
        match self.evaluate(expr, scoped) {
            Some(Evaluated::Value(value)) => Some(value.is_truthy()),
            _ => None,
        }
    }

    /// Value of an `$if` condition, if it resolves to a boolean now
    fn node_condition(&self, node: &TemplateNode, scoped: bool) -> Option<bool> {
        if scoped {
            return None;
        }

        let options = EvaluateOptions::partial();
        let mut stack = ResolutionStack::new();
        let value = Evaluator::new(self.context, &options).node(node, &mut stack);
        match value {
            Ok(Some(Value::Boolean(condition))) if stack.preserved() == 0 => Some(condition),
            _ => None,
        }
    }

    fn node(&mut self, node: &'a TemplateNode, scoped: bool) {
        let mut children: Vec<Work<'a>> = vec![];
        let child = |node: &'a TemplateNode, scoped: bool| Work::Node { node, scoped };

        match node {
            TemplateNode::Literal(_) => {}
            TemplateNode::Template(template) => children.push(Work::Parts {
                parts: &template.parsed.parts,
                template,
                scoped,
            }),
            TemplateNode::Mapping(entries) => {
                for entry in entries.iter() {
                    match entry {
                        MappingEntry::Field(_, node) | MappingEntry::Merge(node, _) => {
                            children.push(child(node, scoped))
                        }
                    }
                }
            }
            TemplateNode::List(items) => children.extend(items.iter().map(|item| child(item, scoped))),
            TemplateNode::Concat(concat) => children.push(child(&concat.value, scoped)),
            TemplateNode::ForEach(for_each) => {
                children.push(child(&for_each.target, scoped));
                if let Some(filter) = &for_each.filter {
                    children.push(child(filter, true));
                }
                children.push(child(&for_each.body, true));
            }
            TemplateNode::If(if_node) => {
                children.push(child(&if_node.condition, scoped));
                match self.node_condition(&if_node.condition, scoped) {
                    Some(true) => children.push(child(&if_node.then, scoped)),
                    Some(false) => children.extend(if_node.otherwise.as_ref().map(|node| child(node, scoped))),
                    None => {
                        children.push(child(&if_node.then, scoped));
                        children.extend(if_node.otherwise.as_ref().map(|node| child(node, scoped)));
                    }
                }
            }
        }

        self.work.extend(children.into_iter().rev());
    }

    fn parts(&mut self, parts: &'a [TemplatePart], template: &'a UnresolvedTemplate, scoped: bool) {
        let mut children: Vec<Work<'a>> = vec![];

        for part in parts {
            match part {
                TemplatePart::Literal(_) | TemplatePart::Escaped(_) => {}
                TemplatePart::Expression { expr, .. } => children.push(Work::Expr {
                    expr,
                    template,
                    scoped,
                }),
                TemplatePart::Conditional(block) => {
                    children.push(Work::Expr {
                        expr: &block.condition,
                        template,
                        scoped,
                    });
                    let branch = |parts: &'a [TemplatePart]| Work::Parts {
                        parts,
                        template,
                        scoped,
                    };
                    let otherwise = block.else_branch.as_deref();
                    match self.condition(&block.condition, scoped) {
                        Some(true) => children.push(branch(&block.then_branch)),
                        Some(false) => children.extend(otherwise.map(branch)),
                        None => {
                            children.push(branch(&block.then_branch));
                            children.extend(otherwise.map(branch));
                        }
                    }
                }
            }
        }

        self.work.extend(children.into_iter().rev());
    }

    fn expr(&mut self, expr: &'a Expr, template: &'a UnresolvedTemplate, scoped: bool) {
        let mut children: Vec<&'a Expr> = vec![];

        match expr {
            Expr::Literal(_) => {}
            Expr::Identifier(name) => {
                if !(scoped && name == ITEM_NAME) {
                    self.emit(vec![PathSegment::Key(name.clone())], ReferenceKind::Resolvable, template);
                }
            }
            Expr::Member { object, key } => match expr.as_context_path() {
                Some(path) => {
                    let mut key_path = vec![PathSegment::Key(path.root.to_string())];
                    let mut kind = ReferenceKind::Resolvable;

                    for key in path.keys.iter().copied() {
                        match key {
                            MemberKey::Name(name) => {
                                if matches!(kind, ReferenceKind::Resolvable) {
                                    key_path.push(PathSegment::Key(name.clone()));
                                }
                            }
                            MemberKey::Computed(key) => {
                                children.push(key);
                                if matches!(kind, ReferenceKind::Resolvable) {
                                    match self.computed_key(key, template) {
                                        Ok(segment) => key_path.push(segment),
                                        Err(error) => kind = ReferenceKind::Unresolvable(Arc::new(error)),
                                    }
                                }
                            }
                        }
                    }

                    if !(scoped && path.root == ITEM_NAME) {
                        self.emit(key_path, kind, template);
                    }
                }
                None => {
                    children.push(object);
                    if let MemberKey::Computed(key) = key {
                        children.push(key);
                    }
                }
            },
            Expr::Call { args, .. } | Expr::Array(args) => children.extend(args),
            Expr::Unary { operand, .. } => children.push(operand),
            Expr::Binary { left, right, .. } => children.extend([left.as_ref(), right.as_ref()]),
            Expr::Logical { op, left, right } => {
                children.push(left);
                // a missing left side makes `&&` false, `||` goes on to the right side
                let short_circuits = match (op, self.evaluate(left, scoped)) {
                    (LogicalOp::And, Some(Evaluated::Value(left))) => !left.is_truthy(),
                    (LogicalOp::And, Some(Evaluated::Missing(_))) => true,
                    (LogicalOp::Or, Some(Evaluated::Value(left))) => left.is_truthy(),
                    (_, _) => false,
                };
                if !short_circuits {
                    children.push(right);
                }
            }
            Expr::Ternary {
                condition,
                consequent,
                alternate,
            } => {
                children.push(condition);
                match self.condition(condition, scoped) {
                    Some(true) => children.push(consequent),
                    Some(false) => children.push(alternate),
                    None => children.extend([consequent.as_ref(), alternate.as_ref()]),
                }
            }
        }

        self.work.extend(children.into_iter().rev().map(|expr| Work::Expr {
            expr,
            template,
            scoped,
        }));
    }

    fn computed_key(&self, key: &Expr, template: &UnresolvedTemplate) -> Result<PathSegment, Error> {
        let mut evaluator = Evaluator::new(self.context, &self.options);
        let failure = match evaluator.expr(key, &mut ResolutionStack::new()) {
            Ok(Evaluated::Value(value)) => match to_segment(value) {
                Ok(segment) => return Ok(segment),
                Err(failure) => failure,
            },
            Ok(Evaluated::Missing(not_found)) => EvalErrorKind::from(not_found).into(),
            Err(failure) => failure,
        };
        Err(failure.into_error(&template.text, &template.source))
    }

    fn emit(&mut self, key_path: KeyPath, kind: ReferenceKind, template: &UnresolvedTemplate) {
        self.ready.push_back(ContextLookupReference {
            key_path,
            kind,
            source: template.source.clone(),
            template: template.text.clone(),
        });
    }
}

impl Iterator for ContextLookupReferences<'_> {
    type Item = ContextLookupReference;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reference) = self.ready.pop_front() {
                return Some(reference);
            }

            match self.work.pop()? {
                Work::Node { node, scoped } => self.node(node, scoped),
                Work::Parts {
                    parts,
                    template,
                    scoped,
                } => self.parts(parts, template, scoped),
                Work::Expr {
                    expr,
                    template,
                    scoped,
                } => self.expr(expr, template, scoped),
            }
        }
    }
}
