use super::{
    lookup_in_value, AvailableKeys, Context, ContextId, Lookup, LookupRequest, NotFound,
    ResolutionCache, ResolutionStack,
};
use crate::collection::{parse_template_collection, MappingEntry, SourceInfo, TemplateNode};
use crate::error::Result;
use crate::evaluate::evaluate_node;
use crate::key_path::{KeyPath, PathSegment};
use std::sync::Arc;

/// Free stack below which a nested lookup switches to a new stack segment
const STACK_RED_ZONE: usize = 256 * 1024;
const STACK_GROW: usize = 8 * 1024 * 1024;

/// A context backed by a template tree
///
/// Templates are evaluated lazily when a lookup passes through them, against the root of the request.
#[derive(Debug)]
pub struct GenericContext {
    id: ContextId,
    data: Arc<TemplateNode>,
    always_partial: bool,
    cache: ResolutionCache,
}

impl GenericContext {
    pub fn new(data: TemplateNode) -> Self {
        Self {
            id: ContextId::new(),
            data: Arc::new(data),
            always_partial: false,
            cache: ResolutionCache::default(),
        }
    }

    /// Parse plain data (which may contain templates) into a context
    pub fn from_value(value: crate::value::Value, source: &SourceInfo) -> Result<Self> {
        Ok(Self::new(parse_template_collection(value, source)?))
    }

    /// Missing keys in this context are passed through even without partial resolution
    ///
    /// For values only known at a later stage, like runtime outputs.
    pub fn always_partial(mut self) -> Self {
        self.always_partial = true;
        self
    }

    fn walk(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup> {
        let key = request.key;
        let mut current: &TemplateNode = &self.data;

        for (depth, segment) in key.iter().enumerate() {
            let traversed =
                || -> KeyPath { request.node_path.iter().chain(&key[..depth]).cloned().collect() };

            let next = match current {
                TemplateNode::Mapping(entries) if !has_merge(entries) => {
                    entries.iter().find_map(|entry| match entry {
                        MappingEntry::Field(name, node) if *name == segment.as_key() => Some(node),
                        _ => None,
                    })
                }
                TemplateNode::List(items) if !has_concat(items) => {
                    segment.as_index().and_then(|index| items.get(index))
                }
                TemplateNode::Literal(value) => {
                    return Ok(lookup_in_value(
                        value.clone(),
                        &key[depth..],
                        &traversed(),
                        request.options,
                    ));
                }
                node => {
                    // templates and operators have to be evaluated before walking further
                    return match evaluate_node(node, request.root, request.options, stack)? {
                        Some(value) => Ok(lookup_in_value(value, &key[depth..], &traversed(), request.options)),
                        None => Ok(Lookup::NotFound(NotFound::key_not_found(
                            segment,
                            traversed(),
                            AvailableKeys::none(),
                        ))),
                    };
                }
            };

            match next {
                Some(next) => current = next,
                None => {
                    let data = self.data.clone();
                    let prefix = key[..depth].to_vec();
                    return Ok(Lookup::NotFound(NotFound::key_not_found(
                        segment,
                        traversed(),
                        AvailableKeys::lazy(move || node_keys(&data, &prefix)),
                    )));
                }
            }
        }

        match current {
            TemplateNode::Literal(value) => Ok(Lookup::Found(value.clone())),
            node => match evaluate_node(node, request.root, request.options, stack)? {
                Some(value) => Ok(Lookup::Found(value)),
                None => Ok(Lookup::NotFound(NotFound::key_not_found(
                    key.last().unwrap_or(&PathSegment::Key(String::new())),
                    request.full_path().split_last().map(|(_, path)| path.to_vec()).unwrap_or_default(),
                    AvailableKeys::none(),
                ))),
            },
        }
    }
}

impl Context for GenericContext {
    fn id(&self) -> &ContextId {
        &self.id
    }

    fn resolve(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup> {
        let root = request.root.id();
        if let Some(value) = self.cache.get(request.key, root, request.options) {
            return Ok(Lookup::Found(value));
        }

        let preserved = stack.preserved();
        // every reference level recurses through the evaluator
        let lookup = match stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
            stack.with_frame(&self.id, request.key, |stack| self.walk(request, stack))
        }) {
            Ok(lookup) => lookup?,
            Err(cycle) => Lookup::NotFound(NotFound::circular(request, cycle)),
        };

        match lookup {
            Lookup::Found(value) => {
                if stack.preserved() == preserved {
                    self.cache.insert(request.key, root, request.options, value.clone());
                }
                Ok(Lookup::Found(value))
            }
            Lookup::NotFound(mut not_found) => {
                not_found.always_partial |= self.always_partial;
                Ok(Lookup::NotFound(not_found))
            }
        }
    }
}

fn has_merge(entries: &[MappingEntry]) -> bool {
    entries.iter().any(|entry| matches!(entry, MappingEntry::Merge(..)))
}

fn has_concat(items: &[TemplateNode]) -> bool {
    items.iter().any(|item| matches!(item, TemplateNode::Concat(_)))
}

/// Keys that are known without evaluating anything
fn node_keys(node: &TemplateNode, path: &[PathSegment]) -> Vec<String> {
    let Some((segment, rest)) = path.split_first() else {
        return match node {
            TemplateNode::Mapping(entries) => entries
                .iter()
                .filter_map(|entry| match entry {
                    MappingEntry::Field(name, _) => Some(name.clone()),
                    MappingEntry::Merge(..) => None,
                })
                .collect(),
            TemplateNode::List(items) => (0..items.len()).map(|index| index.to_string()).collect(),
            TemplateNode::Literal(value) => super::value_keys(value, &[]),
            _ => vec![],
        };
    };

    match node {
        TemplateNode::Mapping(entries) => entries
            .iter()
            .find_map(|entry| match entry {
                MappingEntry::Field(name, node) if *name == segment.as_key() => Some(node_keys(node, rest)),
                _ => None,
            })
            .unwrap_or_default(),
        TemplateNode::List(items) => segment
            .as_index()
            .and_then(|index| items.get(index))
            .map(|item| node_keys(item, rest))
            .unwrap_or_default(),
        TemplateNode::Literal(value) => super::value_keys(value, path),
        _ => vec![],
    }
}
