//! the standard root context
use super::{Context, EnvContext, ErrorContext, FieldSchema, GenericContext, LayeredContext, ObjectContext};
use crate::collection::TemplateNode;
use crate::error::Result;
use crate::value::{Object, Value};
use std::sync::Arc;

pub const PROJECT_CONTEXT_FIELDS: &[FieldSchema] = &[
    FieldSchema {
        name: "project",
        description: "Information about the project",
        kind: "object",
        required: true,
    },
    FieldSchema {
        name: "environment",
        description: "The environment being resolved: name, namespace and fullName",
        kind: "object",
        required: true,
    },
    FieldSchema {
        name: "local",
        description: "The machine running the resolution: env, platform and arch",
        kind: "object",
        required: true,
    },
    FieldSchema {
        name: "var",
        description: "Alias for variables",
        kind: "object",
        required: true,
    },
    FieldSchema {
        name: "variables",
        description: "Project variables, later variable sets take precedence",
        kind: "object",
        required: true,
    },
    FieldSchema {
        name: "secrets",
        description: "Secrets of the environment",
        kind: "object",
        required: true,
    },
    FieldSchema {
        name: "runtime",
        description: "Values only known at runtime, always left unresolved until then",
        kind: "object",
        required: false,
    },
    FieldSchema {
        name: "actions",
        description: "Outputs of actions, only available once they ran",
        kind: "object",
        required: false,
    },
];

const LOCAL_FIELDS: &[FieldSchema] = &[
    FieldSchema {
        name: "env",
        description: "Environment variables",
        kind: "object",
        required: true,
    },
    FieldSchema {
        name: "platform",
        description: "Operating system (darwin, linux, windows, ...)",
        kind: "string",
        required: true,
    },
    FieldSchema {
        name: "arch",
        description: "Processor architecture (x64, arm64, ...)",
        kind: "string",
        required: true,
    },
];

const ACTIONS_UNAVAILABLE: &str =
    "Action outputs are not available at this stage. Only reference them in fields resolved when actions run.";

#[derive(Debug, Clone, Default)]
pub struct ProjectContextParams {
    pub project_name: String,
    pub environment: String,
    pub namespace: Option<String>,
    /// variable sets, lowest precedence first
    pub variables: Vec<TemplateNode>,
    /// `Null` for none
    pub secrets: Value,
    /// outputs of actions that already ran, keyed by kind and name
    pub action_outputs: Option<Value>,
}

fn literal(value: Value) -> Arc<dyn Context> {
    Arc::new(GenericContext::new(TemplateNode::Literal(value)))
}

fn object<const N: usize>(fields: [(&str, Value); N]) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<Object>(),
    )
}

fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}

fn arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        arch => arch,
    }
}

/// Build the root context configuration is resolved against
#[tracing::instrument(level = "debug", skip_all, fields(project = %params.project_name, environment = %params.environment))]
pub fn project_context(params: ProjectContextParams) -> Result<ObjectContext> {
    let full_name = match &params.namespace {
        Some(namespace) => format!("{namespace}.{}", params.environment),
        None => params.environment.clone(),
    };
    let mut environment = object([
        ("name", Value::from(params.environment.as_str())),
        ("fullName", Value::from(full_name)),
    ]);
    if let (Value::Object(environment), Some(namespace)) = (&mut environment, &params.namespace) {
        environment.insert("namespace".to_string(), Value::from(namespace.as_str()));
    }

    let local = ObjectContext::builder("local", LOCAL_FIELDS)
        .field("env", Arc::new(EnvContext::new()))?
        .field("platform", literal(Value::from(platform())))?
        .field("arch", literal(Value::from(arch())))?
        .build()?;

    let variables: Arc<dyn Context> = Arc::new(
        params
            .variables
            .into_iter()
            .fold(LayeredContext::variables(), |layered, layer| {
                layered.with_layer(Arc::new(GenericContext::new(layer)))
            }),
    );

    // no secrets is an empty mapping, so lookups list what is there
    let secrets = match params.secrets {
        Value::Null => Value::Object(Object::new()),
        secrets => secrets,
    };

    let actions: Arc<dyn Context> = match params.action_outputs {
        Some(outputs) => literal(outputs),
        None => Arc::new(ErrorContext::new(ACTIONS_UNAVAILABLE)),
    };

    let context = ObjectContext::builder("project", PROJECT_CONTEXT_FIELDS)
        .field("project", literal(object([("name", Value::from(params.project_name))])))?
        .field("environment", literal(environment))?
        .field("local", Arc::new(local))?
        .field("var", variables.clone())?
        .field("variables", variables)?
        .field("secrets", literal(secrets))?
        .field(
            "runtime",
            Arc::new(GenericContext::new(TemplateNode::Literal(Value::Object(Object::new()))).always_partial()),
        )?
        .field("actions", actions)?
        .build()?;

    Ok(context)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::{parse_template_collection, SourceInfo};
    use crate::evaluate::{resolve_template_string, EvaluateOptions};
    use crate::value;
    use pretty_assertions::assert_eq;

    fn params() -> ProjectContextParams {
        let variables = |data: Value| parse_template_collection(data, &SourceInfo::default()).unwrap();
        ProjectContextParams {
            project_name: "demo".into(),
            environment: "dev".into(),
            namespace: Some("team".into()),
            variables: vec![
                variables(value!({ "name": "base", "replicas": 1 })),
                variables(value!({ "name": "${var.name}-dev", "image": "${project.name}:${var.name}" })),
            ],
            secrets: value!({ "token": "s3cr3t" }),
            action_outputs: None,
        }
    }

    fn resolve(text: &str) -> crate::error::Result<Option<Value>> {
        let context = project_context(params()).unwrap();
        resolve_template_string(text, &context, &EvaluateOptions::default())
    }

    #[test]
    fn project_and_environment() {
        assert_eq!(
            resolve("${project.name} ${environment.name} ${environment.namespace} ${environment.fullName}").unwrap(),
            Some(Value::from("demo dev team team.dev"))
        );
    }

    #[test]
    fn variables_layer_and_reference_each_other() {
        assert_eq!(resolve("${var.name}").unwrap(), Some(Value::from("base-dev")));
        assert_eq!(resolve("${variables.image}").unwrap(), Some(Value::from("demo:base-dev")));
        assert_eq!(resolve("${var.replicas}").unwrap(), Some(Value::Integer(1)));
    }

    #[test]
    fn runtime_values_pass_through() {
        assert_eq!(
            resolve("${runtime.services.api.outputs.url}").unwrap(),
            Some(Value::from("${runtime.services.api.outputs.url}"))
        );
    }

    #[test]
    fn actions_are_unavailable_without_outputs() {
        assert_eq!(
            resolve("${actions.build.api.outputs.image}").unwrap_err().to_string(),
            ACTIONS_UNAVAILABLE
        );

        let context = project_context(ProjectContextParams {
            action_outputs: Some(value!({ "build": { "api": { "outputs": { "image": "api:v1" } } } })),
            ..params()
        })
        .unwrap();
        assert_eq!(
            resolve_template_string("${actions.build.api.outputs.image}", &context, &EvaluateOptions::default())
                .unwrap(),
            Some(Value::from("api:v1"))
        );
    }

    #[test]
    fn secrets_default_to_an_empty_mapping() {
        let context = project_context(ProjectContextParams {
            secrets: Value::Null,
            ..params()
        })
        .unwrap();
        assert_eq!(
            resolve_template_string("${secrets.token}", &context, &EvaluateOptions::default())
                .unwrap_err()
                .to_string(),
            "Invalid template string (${secrets.token}): Could not find key token under secrets."
        );
    }

    #[test]
    fn local_platform() {
        assert_eq!(resolve("${local.platform}").unwrap(), Some(Value::from(platform())));
        assert_eq!(resolve("${typeof local.env}").unwrap(), Some(Value::from("object")));
    }
}
