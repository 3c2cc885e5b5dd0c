use super::{lookup_in_value, AvailableKeys, Context, ContextId, Lookup, LookupRequest, NotFound, ResolutionStack};
use crate::error::Result;
use crate::value::{Object, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// Environment variables of the current process
///
/// The environment is read once, on first lookup; later changes to it are not seen.
#[derive(Debug, Default)]
pub struct EnvContext {
    id: ContextId,
    snapshot: Mutex<Option<Arc<Object>>>,
}

impl EnvContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<Object> {
        self.snapshot
            .lock()
            .get_or_insert_with(|| {
                tracing::trace!("reading process environment");
                // variables that are not valid unicode cannot be referenced from templates
                Arc::new(
                    std::env::vars_os()
                        .filter_map(|(name, value)| Some((name.into_string().ok()?, Value::String(value.into_string().ok()?))))
                        .collect(),
                )
            })
            .clone()
    }
}

impl Context for EnvContext {
    fn id(&self) -> &ContextId {
        &self.id
    }

    fn resolve(&self, request: &LookupRequest<'_>, _stack: &mut ResolutionStack) -> Result<Lookup> {
        let snapshot = self.snapshot();
        let Some((first, rest)) = request.key.split_first() else {
            return Ok(Lookup::Found(Value::Object(snapshot.as_ref().clone())));
        };

        match snapshot.get(&*first.as_key()) {
            Some(value) => {
                let mut node_path = request.node_path.to_vec();
                node_path.push(first.clone());
                Ok(lookup_in_value(value.clone(), rest, &node_path, request.options))
            }
            // listing the whole environment in messages would leak it
            None => Ok(Lookup::NotFound(NotFound::key_not_found(
                first,
                request.node_path.to_vec(),
                AvailableKeys::none(),
            ))),
        }
    }
}
