use super::{AvailableKeys, Context, ContextId, Lookup, LookupRequest, NotFound, ResolutionStack};
use crate::error::{Result, SchemaError};
use crate::key_path::PathSegment;
use crate::value::{Object, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// A field an [ObjectContext] declares
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub description: &'static str,
    /// type of the field's value, for documentation
    pub kind: &'static str,
    pub required: bool,
}

/// A context with a fixed set of named fields, each backed by its own context
#[derive(Debug)]
pub struct ObjectContext {
    id: ContextId,
    name: &'static str,
    schema: &'static [FieldSchema],
    fields: IndexMap<&'static str, Arc<dyn Context>>,
}

impl ObjectContext {
    pub fn builder(name: &'static str, schema: &'static [FieldSchema]) -> ObjectContextBuilder {
        ObjectContextBuilder {
            name,
            schema,
            fields: IndexMap::new(),
        }
    }

    pub fn schema(&self) -> &'static [FieldSchema] {
        self.schema
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().map(|name| name.to_string()).collect()
    }
}

#[derive(Debug)]
pub struct ObjectContextBuilder {
    name: &'static str,
    schema: &'static [FieldSchema],
    fields: IndexMap<&'static str, Arc<dyn Context>>,
}

impl ObjectContextBuilder {
    pub fn field(mut self, name: &str, context: Arc<dyn Context>) -> Result<Self, SchemaError> {
        let Some(declared) = self.schema.iter().find(|field| field.name == name) else {
            return Err(SchemaError::UnknownField {
                context: self.name,
                field: name.to_string(),
                declared: self
                    .schema
                    .iter()
                    .map(|field| field.name)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };

        self.fields.insert(declared.name, context);
        Ok(self)
    }

    pub fn build(self) -> Result<ObjectContext, SchemaError> {
        if let Some(missing) = self
            .schema
            .iter()
            .find(|field| field.required && !self.fields.contains_key(field.name))
        {
            return Err(SchemaError::MissingField {
                context: self.name,
                field: missing.name,
            });
        }

        Ok(ObjectContext {
            id: ContextId::new(),
            name: self.name,
            schema: self.schema,
            fields: self.fields,
        })
    }
}

impl Context for ObjectContext {
    fn id(&self) -> &ContextId {
        &self.id
    }

    #[tracing::instrument(level = "trace", skip_all, fields(context = self.name))]
    fn resolve(&self, request: &LookupRequest<'_>, stack: &mut ResolutionStack) -> Result<Lookup> {
        let Some((first, rest)) = request.key.split_first() else {
            let mut object = Object::new();
            for (name, field) in &self.fields {
                if let Lookup::Found(value) = field.resolve(request, stack)? {
                    object.insert(name.to_string(), value);
                }
            }
            return Ok(Lookup::Found(Value::Object(object)));
        };

        let Some(field) = self.fields.get(first.as_key().as_ref()) else {
            let names = self.field_names();
            return Ok(Lookup::NotFound(NotFound::key_not_found(
                first,
                request.node_path.to_vec(),
                AvailableKeys::lazy(move || names.clone()),
            )));
        };

        let mut node_path = request.node_path.to_vec();
        node_path.push(PathSegment::Key(first.as_key().into_owned()));
        let request = LookupRequest {
            key: rest,
            node_path: &node_path,
            ..*request
        };
        field.resolve(&request, stack)
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

    const FIELDS: &[FieldSchema] = &[
        FieldSchema {
            name: "project",
            description: "The project",
            kind: "object",
            required: true,
        },
        FieldSchema {
            name: "extra",
            description: "Optional",
            kind: "object",
            required: false,
        },
    ];

    fn generic(data: Value) -> Arc<dyn Context> {
        Arc::new(GenericContext::from_value(data, &SourceInfo::default()).unwrap())
    }

    #[test]
    fn fields_are_checked_against_the_schema() {
        let err = ObjectContext::builder("test", FIELDS)
            .field("nope", generic(value!({})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Context test has no field nope. Declared fields: project, extra"
        );

        let err = ObjectContext::builder("test", FIELDS).build().unwrap_err();
        assert_eq!(err.to_string(), "Context test requires field project");
    }

    #[test]
    fn lookups_are_delegated_to_fields() {
        let context = ObjectContext::builder("test", FIELDS)
            .field("project", generic(value!({ "name": "demo" })))
            .unwrap()
            .build()
            .unwrap();
        let options = EvaluateOptions::default();

        assert_eq!(
            resolve_template_string("${project.name}", &context, &options).unwrap(),
            Some(Value::from("demo"))
        );
        assert_eq!(
            resolve_template_string("${project.nope}", &context, &options)
                .unwrap_err()
                .to_string(),
            "Invalid template string (${project.nope}): Could not find key nope under project. Available keys: name."
        );
        assert_eq!(
            resolve_template_string("${extra.a}", &context, &options)
                .unwrap_err()
                .to_string(),
            "Invalid template string (${extra.a}): Could not find key extra. Available keys: project."
        );
    }
}
