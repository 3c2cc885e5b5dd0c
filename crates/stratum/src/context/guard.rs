use super::{Context, ContextId, Lookup, LookupRequest, ResolutionStack};
use crate::error::{ContextError, Result};

/// Fails every lookup with a fixed message
///
/// Stands in for values that are not available at the current stage, so that referencing them explains why.
#[derive(Debug)]
pub struct ErrorContext {
    id: ContextId,
    message: String,
}

impl ErrorContext {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: ContextId::new(),
            message: message.into(),
        }
    }
}

impl Context for ErrorContext {
    fn id(&self) -> &ContextId {
        &self.id
    }

    fn resolve(&self, _request: &LookupRequest<'_>, _stack: &mut ResolutionStack) -> Result<Lookup> {
        Err(ContextError {
            message: self.message.clone(),
        }
        .into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::evaluate::EvaluateOptions;
    use crate::key_path;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_lookup_fails() {
        let context = ErrorContext::new("Action outputs are only available after the action ran.");
        let options = EvaluateOptions::partial();
        let request = LookupRequest::new(&[], &options, &context);
        let err = context.resolve(&request, &mut ResolutionStack::new()).unwrap_err();
        assert_eq!(err.to_string(), "Action outputs are only available after the action ran.");

        let key = key_path!["a", "b"];
        let request = LookupRequest::new(&key, &options, &context);
        assert!(context.resolve(&request, &mut ResolutionStack::new()).is_err());
    }
}
