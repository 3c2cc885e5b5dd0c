use super::{get_context_lookup_references, ContextLookupReference, ReferenceKind};
use crate::collection::{SourceInfo, TemplateNode};
use crate::context::Context;
use crate::error::Error;
use crate::key_path::{KeyPath, PathSegment};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

const ACTIONS_ROOT: &str = "actions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Build,
    Deploy,
    Run,
    Test,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [ActionKind::Build, ActionKind::Deploy, ActionKind::Run, ActionKind::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::Run => "run",
            ActionKind::Test => "test",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == kind)
            .ok_or(())
    }
}

/// A reference to another action, e.g. `${actions.build.api.outputs.image}`
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReference {
    pub kind: ActionKind,
    pub name: String,
    /// the full referenced path, starting with `actions`
    pub key_path: KeyPath,
    pub source: SourceInfo,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum ActionReferenceError {
    #[error("Found invalid action reference (missing kind) at {location}: {template}")]
    MissingKind { template: String, location: SourceInfo },
    #[error("Found invalid action reference (invalid kind '{kind}') at {location}: {template}. Valid kinds are build, deploy, run and test")]
    InvalidKind {
        kind: String,
        template: String,
        location: SourceInfo,
    },
    #[error("Found invalid action reference (missing name) at {location}: {template}")]
    MissingName { template: String, location: SourceInfo },
    #[error("Found invalid action reference (name is not a string) at {location}: {template}")]
    NameNotString { template: String, location: SourceInfo },
    #[error("Found invalid action reference at {location}: {template}. {error}")]
    Unresolvable {
        template: String,
        location: SourceInfo,
        error: Arc<Error>,
    },
}

fn to_action_reference(reference: ContextLookupReference) -> Result<ActionReference, ActionReferenceError> {
    let ContextLookupReference {
        key_path,
        kind,
        source,
        template,
    } = reference;

    if let ReferenceKind::Unresolvable(error) = kind {
        return Err(ActionReferenceError::Unresolvable {
            template,
            location: source,
            error,
        });
    }

    let kind = match key_path.get(1) {
        None => return Err(ActionReferenceError::MissingKind { template, location: source }),
        Some(segment) => match ActionKind::from_str(&segment.as_key()) {
            Ok(kind) => kind,
            Err(()) => {
                return Err(ActionReferenceError::InvalidKind {
                    kind: segment.to_string(),
                    template,
                    location: source,
                })
            }
        },
    };

    let name = match key_path.get(2) {
        None => return Err(ActionReferenceError::MissingName { template, location: source }),
        Some(PathSegment::Index(_)) => return Err(ActionReferenceError::NameNotString { template, location: source }),
        Some(PathSegment::Key(name)) => name.clone(),
    };

    Ok(ActionReference {
        kind,
        name,
        key_path,
        source,
    })
}

/// References to actions, e.g. to order actions by their dependencies
pub fn get_action_references<'a>(
    node: &'a TemplateNode,
    context: &'a dyn Context,
) -> impl Iterator<Item = Result<ActionReference, ActionReferenceError>> + 'a {
    get_context_lookup_references(node, context)
        .filter(|reference| reference.root() == Some(ACTIONS_ROOT))
        .map(to_action_reference)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::parse_template_collection;
    use crate::context::GenericContext;
    use crate::value;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn action_references(input: Value, data: Value) -> Vec<Result<ActionReference, String>> {
        let node = parse_template_collection(input, &SourceInfo::default()).unwrap();
        let context = GenericContext::from_value(data, &SourceInfo::default()).unwrap();
        get_action_references(&node, &context)
            .map(|reference| reference.map_err(|err| err.to_string()))
            .collect()
    }

    #[test]
    fn typed_references() {
        let references = action_references(
            value!({ "image": "${actions.build.api.outputs.image}", "other": "${var.x}" }),
            value!({}),
        );
        assert_eq!(
            references,
            vec![Ok(ActionReference {
                kind: ActionKind::Build,
                name: "api".into(),
                key_path: crate::key_path!["actions", "build", "api", "outputs", "image"],
                source: SourceInfo::new(None, crate::key_path!["image"]),
            })]
        );
    }

    #[test]
    fn names_may_be_computed() {
        let references = action_references(
            value!("${actions.deploy[var.name].outputs}"),
            value!({ "var": { "name": "db" } }),
        );
        let [Ok(reference)] = references.as_slice() else {
            panic!("expected one valid reference, got {references:?}");
        };
        assert_eq!(reference.kind, ActionKind::Deploy);
        assert_eq!(reference.name, "db");
    }

    #[test]
    fn malformed_references() {
        let references = action_references(
            value!({
                "a": "${actions}",
                "b": "${actions.nope.api}",
                "c": "${actions.run}",
                "d": "${actions.test[0]}",
                "e": "${actions.build[var.missing]}"
            }),
            value!({ "var": {} }),
        );

        assert_eq!(
            references,
            vec![
                Err("Found invalid action reference (missing kind) at a: ${actions}".to_string()),
                Err("Found invalid action reference (invalid kind 'nope') at b: ${actions.nope.api}. Valid kinds are build, deploy, run and test".to_string()),
                Err("Found invalid action reference (missing name) at c: ${actions.run}".to_string()),
                Err("Found invalid action reference (name is not a string) at d: ${actions.test[0]}".to_string()),
                Err("Found invalid action reference at e: ${actions.build[var.missing]}. Invalid template string (${actions.build[var.missing]}) at e: Could not find key missing under var.".to_string()),
            ]
        );
    }
}
