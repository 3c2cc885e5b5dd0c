//! template collections
//!
//! [parse_template_collection] turns plain data (as loaded from YAML or JSON) into a [TemplateNode] tree:
//!
//! - strings containing `${` become [UnresolvedTemplate]s
//! - objects with a `$forEach`, `$if` or `$concat` key become operator nodes
//! - `$merge` keys are kept in place so that declaration order decides precedence
//! - subtrees without any of the above collapse into [TemplateNode::Literal]
//!
//! Malformed operator objects are rejected here, before anything is evaluated.
use crate::context::{ContextId, WeakContextId};
use crate::error::{Error, ParseError, StructuralError};
use crate::key_path::{render_key_path, KeyPath, PathSegment};
use crate::template::{is_template, parse_template, ParsedTemplate};
use crate::util::display_template;
use crate::value::{Object, Value};
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

pub const MERGE_KEY: &str = "$merge";
pub const CONCAT_KEY: &str = "$concat";
pub const FOR_EACH_KEY: &str = "$forEach";
pub const FILTER_KEY: &str = "$filter";
pub const RETURN_KEY: &str = "$return";
pub const IF_KEY: &str = "$if";
pub const THEN_KEY: &str = "$then";
pub const ELSE_KEY: &str = "$else";

/// Where a template came from, for error messages
#[derive(Debug, Clone, Default, PartialEq, derive_new::new)]
pub struct SourceInfo {
    pub document: Option<PathBuf>,
    pub path: KeyPath,
}

impl SourceInfo {
    pub fn is_empty(&self) -> bool {
        self.document.is_none() && self.path.is_empty()
    }

    pub fn join(&self, segment: impl Into<PathSegment>) -> SourceInfo {
        let mut path = self.path.clone();
        path.push(segment.into());
        SourceInfo {
            document: self.document.clone(),
            path,
        }
    }
}

impl Display for SourceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            f.write_str("<root>")?;
        } else {
            f.write_str(&render_key_path(&self.path))?;
        }

        if let Some(document) = &self.document {
            write!(f, " in {}", document.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// plain data, nothing to evaluate
    Literal(Value),
    Template(Arc<UnresolvedTemplate>),
    Mapping(Arc<Vec<MappingEntry>>),
    List(Arc<Vec<TemplateNode>>),
    /// `{ $concat: ... }`, only valid as list item
    Concat(Arc<ConcatNode>),
    ForEach(Arc<ForEachNode>),
    If(Arc<IfNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MappingEntry {
    Field(String, TemplateNode),
    Merge(TemplateNode, SourceInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatNode {
    pub value: TemplateNode,
    /// the original object, returned as is when passing through
    pub raw: Value,
    pub source: SourceInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachNode {
    pub target: TemplateNode,
    pub filter: Option<TemplateNode>,
    pub body: TemplateNode,
    pub raw: Value,
    pub source: SourceInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: TemplateNode,
    pub then: TemplateNode,
    pub otherwise: Option<TemplateNode>,
    pub raw: Value,
    pub source: SourceInfo,
}

impl TemplateNode {
    pub fn is_literal(&self) -> bool {
        matches!(self, TemplateNode::Literal(_))
    }

    /// The value of a literal node
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            TemplateNode::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Short description for messages about a node that was not resolved
    pub fn describe(&self) -> String {
        match self {
            TemplateNode::Literal(value) => value.type_name().to_string(),
            TemplateNode::Template(template) => display_template(&template.text),
            TemplateNode::Mapping(_) => MERGE_KEY.to_string(),
            TemplateNode::List(_) | TemplateNode::Concat(_) => CONCAT_KEY.to_string(),
            TemplateNode::ForEach(_) => FOR_EACH_KEY.to_string(),
            TemplateNode::If(_) => IF_KEY.to_string(),
        }
    }
}

/// A template string together with its parse result and source
///
/// Evaluation results are cached per root context. Results containing passed through (partial) templates
/// are never cached.
#[derive(Debug)]
pub struct UnresolvedTemplate {
    pub text: String,
    pub parsed: ParsedTemplate,
    pub source: SourceInfo,
    resolutions: Mutex<Vec<TemplateResolution>>,
}

/// A cached evaluation result
#[derive(Debug, Clone)]
pub struct TemplateResolution {
    pub value: Option<Value>,
    /// context key paths read while evaluating
    pub inputs: IndexSet<KeyPath>,
    root: WeakContextId,
    unescape: bool,
}

impl UnresolvedTemplate {
    pub fn parse(text: impl Into<String>, source: SourceInfo) -> Result<Self, ParseError> {
        let text = text.into();
        let parsed = parse_template(&text).map_err(|error| ParseError {
            location: Some(source.clone()),
            ..error
        })?;

        Ok(Self {
            text,
            parsed,
            source,
            resolutions: Mutex::default(),
        })
    }

    pub fn cached(&self, root: &ContextId, unescape: bool) -> Option<TemplateResolution> {
        self.resolutions
            .lock()
            .iter()
            .find(|resolution| resolution.unescape == unescape && resolution.root.is(root))
            .cloned()
    }

    pub fn store(&self, root: &ContextId, unescape: bool, value: Option<Value>, inputs: IndexSet<KeyPath>) {
        let mut resolutions = self.resolutions.lock();
        resolutions.retain(|resolution| !resolution.root.is_dead());
        resolutions.push(TemplateResolution {
            value,
            inputs,
            root: root.downgrade(),
            unescape,
        });
    }
}

impl PartialEq for UnresolvedTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.source == other.source
    }
}

/// Parse plain data into a template tree
///
/// `source` is the location of `value`; nested nodes extend its path.
#[tracing::instrument(level = "trace", skip(value))]
pub fn parse_template_collection(value: Value, source: &SourceInfo) -> Result<TemplateNode, Error> {
    parse_node(value, source, false)
}

fn parse_node(value: Value, source: &SourceInfo, in_list: bool) -> Result<TemplateNode, Error> {
    match value {
        Value::String(text) if is_template(&text) => Ok(TemplateNode::Template(Arc::new(
            UnresolvedTemplate::parse(text, source.clone())?,
        ))),
        Value::Array(items) => parse_list(items, source),
        Value::Object(object) => parse_object(object, source, in_list),
        literal => Ok(TemplateNode::Literal(literal)),
    }
}

fn parse_list(items: Vec<Value>, source: &SourceInfo) -> Result<TemplateNode, Error> {
    let nodes = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_node(item, &source.join(index), true))
        .collect::<Result<Vec<_>, _>>()?;

    if nodes.iter().all(TemplateNode::is_literal) {
        let values = nodes
            .into_iter()
            .filter_map(|node| match node {
                TemplateNode::Literal(value) => Some(value),
                _ => None,
            })
            .collect();
        return Ok(TemplateNode::Literal(Value::Array(values)));
    }

    Ok(TemplateNode::List(Arc::new(nodes)))
}

fn parse_object(object: Object, source: &SourceInfo, in_list: bool) -> Result<TemplateNode, Error> {
    if object.contains_key(FOR_EACH_KEY) {
        return parse_for_each(object, source);
    }
    if object.contains_key(IF_KEY) {
        return parse_if(object, source);
    }
    if object.contains_key(CONCAT_KEY) {
        return parse_concat(object, source, in_list);
    }

    let mut entries = Vec::with_capacity(object.len());
    for (key, value) in object {
        if key == MERGE_KEY {
            let merge_source = source.join(MERGE_KEY);
            entries.push(MappingEntry::Merge(
                parse_node(value, &merge_source, false)?,
                merge_source,
            ));
        } else {
            let node = parse_node(value, &source.join(key.as_str()), false)?;
            entries.push(MappingEntry::Field(key, node));
        }
    }

    let all_literal = entries
        .iter()
        .all(|entry| matches!(entry, MappingEntry::Field(_, node) if node.is_literal()));

    if all_literal {
        let object = entries
            .into_iter()
            .filter_map(|entry| match entry {
                MappingEntry::Field(key, TemplateNode::Literal(value)) => Some((key, value)),
                _ => None,
            })
            .collect();
        return Ok(TemplateNode::Literal(Value::Object(object)));
    }

    Ok(TemplateNode::Mapping(Arc::new(entries)))
}

pub(crate) fn structural_error(operator: &'static str, source: &SourceInfo, message: String) -> Error {
    StructuralError {
        operator,
        message,
        location: Some(source.clone()),
    }
    .into()
}

/// Reject keys other than `allowed` next to `operator`
fn check_keys(
    operator: &'static str,
    object: &Object,
    allowed: &[&str],
    source: &SourceInfo,
) -> Result<(), Error> {
    let extra: Vec<String> = object
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect();

    if extra.is_empty() {
        return Ok(());
    }

    Err(structural_error(
        operator,
        source,
        format!(
            "Found unexpected key(s) {} next to {operator}. Allowed keys: {}",
            crate::util::natural_list(&extra),
            allowed.join(", ")
        ),
    ))
}

fn parse_for_each(mut object: Object, source: &SourceInfo) -> Result<TemplateNode, Error> {
    check_keys(
        FOR_EACH_KEY,
        &object,
        &[FOR_EACH_KEY, RETURN_KEY, FILTER_KEY],
        source,
    )?;
    let raw = Value::Object(object.clone());

    let target = object.shift_remove(FOR_EACH_KEY).unwrap_or(Value::Null);
    let Some(body) = object.shift_remove(RETURN_KEY) else {
        return Err(structural_error(
            FOR_EACH_KEY,
            source,
            format!("Missing {RETURN_KEY} field next to {FOR_EACH_KEY}"),
        ));
    };
    let filter = object.shift_remove(FILTER_KEY);

    Ok(TemplateNode::ForEach(Arc::new(ForEachNode {
        target: parse_node(target, &source.join(FOR_EACH_KEY), false)?,
        filter: filter
            .map(|filter| parse_node(filter, &source.join(FILTER_KEY), false))
            .transpose()?,
        body: parse_node(body, &source.join(RETURN_KEY), false)?,
        raw,
        source: source.clone(),
    })))
}

fn parse_if(mut object: Object, source: &SourceInfo) -> Result<TemplateNode, Error> {
    check_keys(IF_KEY, &object, &[IF_KEY, THEN_KEY, ELSE_KEY], source)?;
    let raw = Value::Object(object.clone());

    let condition = object.shift_remove(IF_KEY).unwrap_or(Value::Null);
    let Some(then) = object.shift_remove(THEN_KEY) else {
        return Err(structural_error(
            IF_KEY,
            source,
            format!("Missing {THEN_KEY} field next to {IF_KEY}"),
        ));
    };
    let otherwise = object.shift_remove(ELSE_KEY);

    Ok(TemplateNode::If(Arc::new(IfNode {
        condition: parse_node(condition, &source.join(IF_KEY), false)?,
        then: parse_node(then, &source.join(THEN_KEY), false)?,
        otherwise: otherwise
            .map(|otherwise| parse_node(otherwise, &source.join(ELSE_KEY), false))
            .transpose()?,
        raw,
        source: source.clone(),
    })))
}

fn parse_concat(mut object: Object, source: &SourceInfo, in_list: bool) -> Result<TemplateNode, Error> {
    check_keys(CONCAT_KEY, &object, &[CONCAT_KEY], source)?;
    if !in_list {
        return Err(structural_error(
            CONCAT_KEY,
            source,
            format!("{CONCAT_KEY} may only be used as a list item"),
        ));
    }
    let raw = Value::Object(object.clone());
    let value = object.shift_remove(CONCAT_KEY).unwrap_or(Value::Null);

    Ok(TemplateNode::Concat(Arc::new(ConcatNode {
        value: parse_node(value, &source.join(CONCAT_KEY), false)?,
        raw,
        source: source.clone(),
    })))
}

/// Fails when the tree still contains anything that needs evaluating
impl TryFrom<TemplateNode> for Value {
    type Error = Error;

    fn try_from(node: TemplateNode) -> Result<Self, Self::Error> {
        use crate::visit::VisitTemplates;

        if let TemplateNode::Literal(value) = node {
            return Ok(value);
        }

        let mut first = None;
        node.visit_templates(&mut |template: &UnresolvedTemplate| {
            if first.is_none() {
                first = Some((display_template(&template.text), template.source.clone()));
            }
        });

        let (template, location) = match first {
            Some((template, location)) => (template, Some(location)),
            None => (node.describe(), None),
        };
        Err(Error::Unresolved { template, location })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{key_path, value};
    use pretty_assertions::assert_eq;

    fn parse(value: Value) -> Result<TemplateNode, Error> {
        parse_template_collection(value, &SourceInfo::default())
    }

    #[test]
    fn plain_data_stays_literal() {
        let data = value!({ "a": [1, "two", { "three": 3.0 }], "b": null });
        assert_eq!(parse(data.clone()).unwrap(), TemplateNode::Literal(data));
    }

    #[test]
    fn templates_keep_their_position() {
        let node = parse(value!({ "a": [1, "${b}"] })).unwrap();

        let TemplateNode::Mapping(entries) = node else {
            panic!("expected a mapping, got {node:?}");
        };
        let MappingEntry::Field(key, TemplateNode::List(items)) = &entries[0] else {
            panic!("expected a list field");
        };
        assert_eq!(key, "a");
        assert_eq!(items[0], TemplateNode::Literal(Value::Integer(1)));

        let TemplateNode::Template(template) = &items[1] else {
            panic!("expected a template");
        };
        assert_eq!(template.text, "${b}");
        assert_eq!(template.source.path, key_path!["a", 1usize]);
    }

    #[test]
    fn operator_objects() {
        let node = parse(value!({ "$forEach": "${var.list}", "$return": "${item.value}" })).unwrap();
        assert!(matches!(node, TemplateNode::ForEach(_)));

        let node = parse(value!({ "$if": true, "$then": 1 })).unwrap();
        let TemplateNode::If(if_node) = node else {
            panic!("expected $if");
        };
        assert_eq!(if_node.otherwise, None);

        let node = parse(value!([{ "$concat": [1, 2] }])).unwrap();
        let TemplateNode::List(items) = node else {
            panic!("expected a list");
        };
        assert!(matches!(items[0], TemplateNode::Concat(_)));
    }

    #[test]
    fn merge_keeps_declaration_order() {
        let node = parse(value!({ "a": 1, "$merge": { "b": 2 }, "c": 3 })).unwrap();
        let TemplateNode::Mapping(entries) = node else {
            panic!("expected a mapping");
        };
        assert!(matches!(&entries[0], MappingEntry::Field(key, _) if key == "a"));
        assert!(matches!(&entries[1], MappingEntry::Merge(_, _)));
        assert!(matches!(&entries[2], MappingEntry::Field(key, _) if key == "c"));
    }

    #[test]
    fn malformed_operators_fail_at_parse_time() {
        let err = parse(value!({ "$forEach": [], "$return": 1, "other": 2 })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid $forEach object at <root>: Found unexpected key(s) other next to $forEach. Allowed keys: $forEach, $return, $filter"
        );

        let err = parse(value!({ "$forEach": [] })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid $forEach object at <root>: Missing $return field next to $forEach"
        );

        let err = parse(value!({ "nested": { "$if": true } })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid $if object at nested: Missing $then field next to $if"
        );

        let err = parse(value!({ "$concat": [] })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid $concat object at <root>: $concat may only be used as a list item"
        );
    }

    #[test]
    fn parse_errors_carry_the_location() {
        let source = SourceInfo::new(Some("garden.yml".into()), vec![]);
        let err = parse_template_collection(value!({ "a": "${b" }), &source).unwrap_err();
        let Error::Parse(parse_error) = err else {
            panic!("expected a parse error");
        };
        assert_eq!(parse_error.location.unwrap().to_string(), "a in garden.yml");
    }

    #[test]
    fn unresolved_trees_do_not_convert_to_values() {
        assert_eq!(
            Value::try_from(parse(value!({ "a": 1 })).unwrap()).unwrap(),
            value!({ "a": 1 })
        );

        let err = Value::try_from(parse(value!({ "a": ["${b}"] })).unwrap()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Found unresolved template at a[0] (${b}); resolve it before using it as plain data"
        );
    }
}
