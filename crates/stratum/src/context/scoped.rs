use super::{lookup_in_value, Context, ContextId, Lookup, LookupRequest, ResolutionStack};
use crate::error::Result;
use crate::key_path::PathSegment;
use crate::value::Value;

/// Binds `name` to a value on top of a parent context
#[derive(Debug)]
pub struct ScopedContext<'a> {
    id: ContextId,
    parent: &'a dyn Context,
    name: &'static str,
    value: Value,
}

impl<'a> ScopedContext<'a> {
    pub fn new(parent: &'a dyn Context, name: &'static str, value: Value) -> Self {
        Self {
            id: ContextId::new(),
            parent,
            name,
            value,
        }
    }
}

impl Context for ScopedContext<'_> {
    fn id(&self) -> &ContextId {
        &self.id
    }

    fn resolve(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup> {
        match request.key.split_first() {
            Some((PathSegment::Key(first), rest)) if first == self.name => {
                let mut node_path = request.node_path.to_vec();
                node_path.push(PathSegment::Key(first.clone()));
                Ok(lookup_in_value(self.value.clone(), rest, &node_path, request.options))
            }
            _ => self.parent.resolve(request, stack),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::SourceInfo;
    use crate::context::GenericContext;
    use crate::evaluate::{resolve_template_string, EvaluateOptions};
    use crate::value;
    use pretty_assertions::assert_eq;

    #[test]
    fn name_shadows_the_parent() {
        let parent = GenericContext::from_value(value!({ "item": "parent", "other": 1 }), &SourceInfo::default())
            .unwrap();
        let scope = ScopedContext::new(&parent, "item", value!({ "value": "scoped" }));
        let options = EvaluateOptions::default();

        assert_eq!(
            resolve_template_string("${item.value}-${other}", &scope, &options).unwrap(),
            Some(Value::from("scoped-1"))
        );
        assert_eq!(
            resolve_template_string("${item.nope}", &scope, &options)
                .unwrap_err()
                .to_string(),
            "Invalid template string (${item.nope}): Could not find key nope under item. Available keys: value."
        );
    }
}
