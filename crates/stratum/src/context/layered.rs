use super::{AvailableKeys, Context, ContextId, Lookup, LookupRequest, NotFound, ResolutionStack};
use crate::error::Result;
use crate::value::Value;
use std::sync::Arc;

/// Layers of contexts, later layers take precedence
///
/// Scalars and lists of the topmost layer defining a key win. When several layers resolve a key to a mapping,
/// the mappings are deep-merged.
#[derive(Debug, Default)]
pub struct LayeredContext {
    id: ContextId,
    layers: Vec<Arc<dyn Context>>,
    circular_as_missing: bool,
}

impl LayeredContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers of variables which may reference each other
    ///
    /// A variable referring to itself through another layer (`var.a: ${var.a}-suffix`) sees the layers
    /// below, so circular references in a layer are treated as missing keys.
    pub fn variables() -> Self {
        Self {
            circular_as_missing: true,
            ..Self::default()
        }
    }

    pub fn with_layer(mut self, layer: Arc<dyn Context>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Context for LayeredContext {
    fn id(&self) -> &ContextId {
        &self.id
    }

    fn resolve(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup> {
        let mut objects: Vec<Value> = vec![];
        let mut missing: Option<NotFound> = None;

        for layer in self.layers.iter().rev() {
            match layer.resolve(request, stack)? {
                Lookup::Found(value @ Value::Object(_)) => objects.push(value),
                // a scalar below a mapping is shadowed by it
                Lookup::Found(_) if !objects.is_empty() => break,
                Lookup::Found(value) => return Ok(Lookup::Found(value)),
                Lookup::NotFound(not_found) if not_found.is_circular() && !self.circular_as_missing => {
                    return Ok(Lookup::NotFound(not_found));
                }
                Lookup::NotFound(not_found) => {
                    tracing::trace!(%not_found, "not found in layer");
                    missing = Some(match missing {
                        None => not_found,
                        Some(previous) => deepest(previous, not_found),
                    });
                }
            }
        }

        // merge bottom-up so that upper layers win
        if let Some(merged) = objects.into_iter().rev().reduce(Value::deep_merge) {
            return Ok(Lookup::Found(merged));
        }

        Ok(Lookup::NotFound(missing.unwrap_or_else(|| {
            let key = request.key.first().cloned().unwrap_or_else(|| "".into());
            NotFound::key_not_found(&key, request.node_path.to_vec(), AvailableKeys::none())
        })))
    }
}

/// Keep the explanation which got furthest, with the keys all layers offered at that depth
fn deepest(a: NotFound, b: NotFound) -> NotFound {
    let always_partial = a.always_partial || b.always_partial;
    let mut result = match a.depth().cmp(&b.depth()) {
        std::cmp::Ordering::Less => b,
        std::cmp::Ordering::Greater => a,
        std::cmp::Ordering::Equal => {
            let NotFound {
                reason,
                key,
                node_path,
                available_keys,
                ..
            } = a;
            NotFound {
                reason,
                key,
                node_path,
                available_keys: available_keys.merge(b.available_keys),
                always_partial,
            }
        }
    };
    result.always_partial = always_partial;
    result
}
