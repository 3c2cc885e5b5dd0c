use super::{Context, ContextId, Lookup, LookupRequest, ResolutionStack};
use crate::error::Result;
use std::sync::Arc;

/// Evaluates the templates of `inner` against `root`, whatever context the lookup started from
///
/// Used when a context is mounted into another one, but its templates refer to its original surroundings.
#[derive(Debug, derive_new::new)]
pub struct CapturedContext {
    #[new(default)]
    id: ContextId,
    inner: Arc<dyn Context>,
    root: Arc<dyn Context>,
}

impl Context for CapturedContext {
    fn id(&self) -> &ContextId {
        &self.id
    }

    fn resolve(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup> {
        let request = LookupRequest {
            root: self.root.as_ref(),
            ..*request
        };
        self.inner.resolve(&request, stack)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::SourceInfo;
    use crate::context::{GenericContext, LayeredContext};
    use crate::evaluate::{resolve_template_string, EvaluateOptions};
    use crate::value;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn templates_see_the_captured_root() {
        let original: Arc<dyn Context> = Arc::new(
            GenericContext::from_value(value!({ "name": "original", "greeting": "hi ${name}" }), &SourceInfo::default())
                .unwrap(),
        );
        let captured: Arc<dyn Context> = Arc::new(CapturedContext::new(original.clone(), original));

        let context = LayeredContext::new().with_layer(captured).with_layer(Arc::new(
            GenericContext::from_value(value!({ "name": "shadowing" }), &SourceInfo::default()).unwrap(),
        ));

        assert_eq!(
            resolve_template_string("${greeting} / ${name}", &context, &EvaluateOptions::default()).unwrap(),
            Some(Value::from("hi original / shadowing"))
        );
    }
}
