use super::Evaluator;
use crate::collection::{
    structural_error, ConcatNode, ForEachNode, IfNode, MappingEntry, TemplateNode, CONCAT_KEY,
    FILTER_KEY, FOR_EACH_KEY, IF_KEY, MERGE_KEY,
};
use crate::context::{ResolutionStack, ScopedContext};
use crate::error::Result;
use crate::key_path::PathSegment;
use crate::value::{Object, Value};

/// Name the current `$forEach` entry is bound to
pub(crate) const ITEM_NAME: &str = "item";

fn type_of(value: &Option<Value>) -> &'static str {
    value.as_ref().map_or("undefined", Value::type_name)
}

impl Evaluator<'_> {
    /// Evaluate `node`, reporting whether it was passed through unresolved
    fn operand(
        &mut self,
        node: &TemplateNode,
        stack: &mut ResolutionStack,
    ) -> Result<(Option<Value>, bool)> {
        let preserved = stack.preserved();
        let value = self.node(node, stack)?;
        Ok((value, stack.preserved() != preserved))
    }

    pub(super) fn mapping(
        &mut self,
        entries: &[MappingEntry],
        stack: &mut ResolutionStack,
    ) -> Result<Option<Value>> {
        let mut object = Object::new();

        for entry in entries {
            match entry {
                MappingEntry::Field(key, node) => {
                    if let Some(value) = self.node(node, stack)? {
                        object.insert(key.clone(), value);
                    }
                }
                MappingEntry::Merge(node, source) => match self.operand(node, stack)? {
                    (None, _) => tracing::trace!(%source, "nothing to merge"),
                    (Some(Value::Object(merged)), _) => object.extend(merged),
                    (Some(value @ Value::String(_)), true) => {
                        object.insert(MERGE_KEY.to_string(), value);
                    }
                    (value, _) => {
                        return Err(structural_error(
                            MERGE_KEY,
                            source,
                            format!(
                                "Value of {MERGE_KEY} must be (or resolve to) a mapping (got {})",
                                type_of(&value)
                            ),
                        ))
                    }
                },
            }
        }

        Ok(Some(Value::Object(object)))
    }

    pub(super) fn list(
        &mut self,
        items: &[TemplateNode],
        stack: &mut ResolutionStack,
    ) -> Result<Option<Value>> {
        let mut values = Vec::with_capacity(items.len());

        for item in items {
            match item {
                TemplateNode::Concat(concat) => self.concat(concat, &mut values, stack)?,
                item => {
                    // absent items are dropped, the list closes the gap
                    if let Some(value) = self.node(item, stack)? {
                        values.push(value);
                    }
                }
            }
        }

        Ok(Some(Value::Array(values)))
    }

    fn concat(
        &mut self,
        concat: &ConcatNode,
        values: &mut Vec<Value>,
        stack: &mut ResolutionStack,
    ) -> Result<()> {
        match self.operand(&concat.value, stack)? {
            (Some(Value::Array(items)), _) => values.extend(items),
            (Some(Value::String(_)), true) => values.push(concat.raw.clone()),
            (value, _) => {
                return Err(structural_error(
                    CONCAT_KEY,
                    &concat.source,
                    format!(
                        "Value of {CONCAT_KEY} must be (or resolve to) a list (got {})",
                        type_of(&value)
                    ),
                ))
            }
        }
        Ok(())
    }

    pub(super) fn for_each(
        &mut self,
        for_each: &ForEachNode,
        stack: &mut ResolutionStack,
    ) -> Result<Option<Value>> {
        let entries: Vec<(Value, Value)> = match self.operand(&for_each.target, stack)? {
            (Some(Value::Array(items)), _) => items
                .into_iter()
                .enumerate()
                .map(|(index, value)| (Value::Integer(index as i64), value))
                .collect(),
            (Some(Value::Object(object)), _) => object
                .into_iter()
                .map(|(key, value)| (Value::String(key), value))
                .collect(),
            (Some(Value::String(_)), true) => return Ok(Some(for_each.raw.clone())),
            (value, _) => {
                return Err(structural_error(
                    FOR_EACH_KEY,
                    &for_each.source,
                    format!(
                        "Value of {FOR_EACH_KEY} must be (or resolve to) a list or mapping (got {})",
                        type_of(&value)
                    ),
                ))
            }
        };
        tracing::debug!(source = %for_each.source, entries = entries.len(), "expanding $forEach");

        let mut output = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let mut item = Object::new();
            item.insert("key".to_string(), key);
            item.insert("value".to_string(), value);

            let scope = ScopedContext::new(self.root, ITEM_NAME, Value::Object(item));
            let mut scoped = Evaluator::new(&scope, self.options);

            if let Some(filter) = &for_each.filter {
                match scoped.operand(filter, stack)? {
                    (Some(Value::Boolean(true)), _) => {}
                    (Some(Value::Boolean(false)), _) => continue,
                    (Some(Value::String(_)), true) => return Ok(Some(for_each.raw.clone())),
                    (value, _) => {
                        return Err(structural_error(
                            FOR_EACH_KEY,
                            &for_each.source,
                            format!(
                                "{FILTER_KEY} clause in {FOR_EACH_KEY} must resolve to a boolean (got {})",
                                type_of(&value)
                            ),
                        ))
                    }
                }
            }

            if let Some(value) = scoped.node(&for_each.body, stack)? {
                output.push(value);
            }

            let inputs = std::mem::take(&mut scoped.inputs);
            self.inputs.extend(inputs.into_iter().filter(
                |path| !matches!(path.first(), Some(PathSegment::Key(root)) if root == ITEM_NAME),
            ));
        }

        Ok(Some(Value::Array(output)))
    }

    pub(super) fn if_node(
        &mut self,
        if_node: &IfNode,
        stack: &mut ResolutionStack,
    ) -> Result<Option<Value>> {
        match self.operand(&if_node.condition, stack)? {
            (Some(Value::Boolean(true)), _) => self.node(&if_node.then, stack),
            (Some(Value::Boolean(false)), _) => match &if_node.otherwise {
                Some(otherwise) => self.node(otherwise, stack),
                None => Ok(None),
            },
            (Some(Value::String(_)), true) => Ok(Some(if_node.raw.clone())),
            (value, _) => Err(structural_error(
                IF_KEY,
                &if_node.source,
                format!(
                    "Value of {IF_KEY} must resolve to a boolean (got {})",
                    type_of(&value)
                ),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::collection::{parse_template_collection, SourceInfo};
    use crate::context::GenericContext;
    use crate::evaluate::{evaluate, evaluate_with_inputs, EvaluateOptions};
    use crate::value;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn run(input: Value, data: Value, options: &EvaluateOptions) -> crate::error::Result<Option<Value>> {
        let node = parse_template_collection(input, &SourceInfo::default())?;
        let context = GenericContext::from_value(data, &SourceInfo::default())?;
        evaluate(&node, &context, options)
    }

    fn resolve(input: Value, data: Value) -> Option<Value> {
        run(input, data, &EvaluateOptions::default()).unwrap()
    }

    fn resolve_err(input: Value, data: Value) -> String {
        run(input, data, &EvaluateOptions::default())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn merge_follows_declaration_order() {
        let data = value!({ "obj": { "a": "from merge", "b": "from merge" } });
        assert_eq!(
            resolve(value!({ "a": "own", "$merge": "${obj}", "c": "own" }), data.clone()),
            Some(value!({ "a": "from merge", "b": "from merge", "c": "own" }))
        );
        assert_eq!(
            resolve(value!({ "$merge": "${obj}", "a": "own" }), data),
            Some(value!({ "a": "own", "b": "from merge" }))
        );
    }

    #[test]
    fn merge_requires_a_mapping() {
        assert_eq!(
            resolve_err(value!({ "$merge": "${list}" }), value!({ "list": [1] })),
            "Invalid $merge object at $merge: Value of $merge must be (or resolve to) a mapping (got array)"
        );
    }

    #[test]
    fn absent_values_are_dropped() {
        assert_eq!(
            resolve(value!({ "a": "${x}?", "b": ["${x}?", 1] }), value!({})),
            Some(value!({ "b": [1] }))
        );
        assert_eq!(
            resolve(value!({ "$merge": "${x}?", "a": 1 }), value!({})),
            Some(value!({ "a": 1 }))
        );
    }

    #[test]
    fn concat_splices_lists() {
        assert_eq!(
            resolve(
                value!([1, { "$concat": "${list}" }, { "$concat": [4] }]),
                value!({ "list": [2, 3] })
            ),
            Some(value!([1, 2, 3, 4]))
        );
        assert_eq!(
            resolve_err(value!([{ "$concat": "${x}" }]), value!({ "x": "nope" })),
            "Invalid $concat object at [0]: Value of $concat must be (or resolve to) a list (got string)"
        );
    }

    #[test]
    fn for_each_over_lists_and_mappings() {
        let data = value!({ "list": ["a", "b"], "map": { "x": 1, "y": 2 } });

        assert_eq!(
            resolve(
                value!({ "$forEach": "${list}", "$return": "${item.key}:${item.value}" }),
                data.clone()
            ),
            Some(value!(["0:a", "1:b"]))
        );
        assert_eq!(
            resolve(
                value!({
                    "$forEach": "${map}",
                    "$filter": "${item.value > 1}",
                    "$return": { "name": "${item.key}" }
                }),
                data
            ),
            Some(value!([{ "name": "y" }]))
        );
    }

    #[test]
    fn for_each_over_nothing_is_empty() {
        assert_eq!(
            resolve(value!({ "$forEach": "${list}", "$return": "${item.value}" }), value!({ "list": [] })),
            Some(value!([]))
        );
        assert_eq!(
            resolve(value!({ "$forEach": {}, "$return": "${item.value}" }), value!({})),
            Some(value!([]))
        );
    }

    #[test]
    fn for_each_requires_a_list_or_mapping() {
        assert_eq!(
            resolve_err(value!({ "$forEach": "${name}", "$return": 1 }), value!({ "name": "api" })),
            "Invalid $forEach object at <root>: Value of $forEach must be (or resolve to) a list or mapping (got string)"
        );
        assert_eq!(
            resolve_err(value!({ "$forEach": 3, "$return": 1 }), value!({})),
            "Invalid $forEach object at <root>: Value of $forEach must be (or resolve to) a list or mapping (got number)"
        );
    }

    #[test]
    fn for_each_filter_must_be_boolean() {
        assert_eq!(
            resolve_err(
                value!({ "$forEach": [1], "$filter": "${item.value}", "$return": 1 }),
                value!({})
            ),
            "Invalid $forEach object at <root>: $filter clause in $forEach must resolve to a boolean (got number)"
        );
    }

    #[test]
    fn for_each_inputs_exclude_the_item() {
        let node = parse_template_collection(
            value!({ "$forEach": "${list}", "$return": "${item.value}-${suffix}" }),
            &SourceInfo::default(),
        )
        .unwrap();
        let context =
            GenericContext::from_value(value!({ "list": [1], "suffix": "s" }), &SourceInfo::default()).unwrap();

        let resolved = evaluate_with_inputs(&node, &context, &EvaluateOptions::default()).unwrap();
        assert_eq!(resolved.value, Some(value!(["1-s"])));
        assert_eq!(
            resolved.inputs.into_iter().collect::<Vec<_>>(),
            vec![crate::key_path!["list"], crate::key_path!["suffix"]]
        );
    }

    #[test]
    fn if_selects_a_branch() {
        let data = value!({ "on": true, "off": false });
        assert_eq!(
            resolve(value!({ "$if": "${on}", "$then": 1, "$else": 2 }), data.clone()),
            Some(Value::Integer(1))
        );
        assert_eq!(
            resolve(value!({ "a": { "$if": "${off}", "$then": 1 } }), data.clone()),
            Some(value!({}))
        );
        assert_eq!(
            resolve_err(value!({ "$if": "${1}", "$then": 1 }), data),
            "Invalid $if object at <root>: Value of $if must resolve to a boolean (got number)"
        );
    }

    #[test]
    fn partial_resolution_keeps_operators() {
        let options = EvaluateOptions::partial();
        let for_each = value!({ "$forEach": "${var.list}", "$return": "${item.value}" });
        assert_eq!(run(for_each.clone(), value!({}), &options).unwrap(), Some(for_each));

        let if_node = value!({ "$if": "${var.flag}", "$then": 1 });
        assert_eq!(run(if_node.clone(), value!({}), &options).unwrap(), Some(if_node));

        assert_eq!(
            run(value!([0, { "$concat": "${var.list}" }]), value!({}), &options).unwrap(),
            Some(value!([0, { "$concat": "${var.list}" }]))
        );
        assert_eq!(
            run(value!({ "$merge": "${var.obj}", "a": 1 }), value!({}), &options).unwrap(),
            Some(value!({ "$merge": "${var.obj}", "a": 1 }))
        );
    }
}
