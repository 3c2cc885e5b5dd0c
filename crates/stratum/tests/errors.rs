//! Error messages as seen by users

use stratum::context::GenericContext;
use stratum::{evaluate, parse_template_collection, value, EvaluateOptions, SourceInfo, Value};

fn resolve_err(input: Value, context: Value) -> String {
    let context = GenericContext::from_value(context, &SourceInfo::default()).unwrap();
    parse_template_collection(input, &SourceInfo::default())
        .and_then(|node| evaluate(&node, &context, &EvaluateOptions::default()))
        .unwrap_err()
        .to_string()
}

#[test]
fn missing_keys_list_alternatives() {
    insta::assert_snapshot!(
        resolve_err(value!({ "image": "${var.c}" }), value!({ "var": { "a": 1, "b": 2 } })),
        @"Invalid template string (${var.c}) at image: Could not find key c under var. Available keys: a and b."
    );
}

#[test]
fn circular_references_show_the_cycle() {
    insta::assert_snapshot!(
        resolve_err(value!("${a}"), value!({ "a": "${b}", "b": "${a}" })),
        @"Invalid template string (${a}) at b: Circular reference detected when resolving key a (a -> b -> a)"
    );
}

#[test]
fn structural_errors_name_the_operator() {
    insta::assert_snapshot!(
        resolve_err(value!({ "$merge": "${list}" }), value!({ "list": [1] })),
        @"Invalid $merge object at $merge: Value of $merge must be (or resolve to) a mapping (got array)"
    );
    insta::assert_snapshot!(
        resolve_err(value!({ "nested": { "$if": true } }), value!({})),
        @"Invalid $if object at nested: Missing $then field next to $if"
    );
}
