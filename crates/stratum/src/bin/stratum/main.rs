mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratum::context::{project_context, Context, GenericContext, LayeredContext, ProjectContextParams};
use stratum::key_path::parse_dotted;
use stratum::references::{get_action_references, get_context_lookup_references};
use stratum::value::{Object, Value};
use stratum::{parse_template_collection, EvaluateOptions, SourceInfo, TemplateNode};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("STRATUM_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Resolve(resolve_cli) => resolve(resolve_cli),
        cli::Command::Evaluate(evaluate_cli) => evaluate(evaluate_cli),
        cli::Command::References(references_cli) => references(references_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn resolve(cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let node = load_document(cli.file.as_deref())?;
    let context = root_context(&cli.context)?;

    let value = stratum::evaluate(&node, &context, &options(&cli.evaluation))?;
    output(&cli.output, &value.unwrap_or_default())
}

pub fn evaluate(cli: cli::EvaluateCommand) -> anyhow::Result<()> {
    let context = root_context(&cli.context)?;

    let value = stratum::resolve_template_string(&cli.template, &context, &options(&cli.evaluation))?;
    output(&cli.output, &value.unwrap_or_default())
}

pub fn references(cli: cli::ReferencesCommand) -> anyhow::Result<()> {
    let node = load_document(cli.file.as_deref())?;
    let context = root_context(&cli.context)?;

    let lookups: Vec<Value> = get_context_lookup_references(&node, &context)
        .map(|reference| {
            let mut entry = Object::new();
            entry.insert("keyPath".into(), reference_path(&reference.key_path));
            entry.insert("resolvable".into(), Value::from(reference.is_resolvable()));
            entry.insert("template".into(), Value::from(reference.template));
            entry.insert("source".into(), Value::from(reference.source.to_string()));
            if let stratum::references::ReferenceKind::Unresolvable(error) = reference.kind {
                entry.insert("error".into(), Value::from(error.to_string()));
            }
            Value::Object(entry)
        })
        .collect();

    let actions: Vec<Value> = get_action_references(&node, &context)
        .map(|reference| {
            let mut entry = Object::new();
            match reference {
                Ok(reference) => {
                    entry.insert("kind".into(), Value::from(reference.kind.as_str()));
                    entry.insert("name".into(), Value::from(reference.name));
                    entry.insert("keyPath".into(), reference_path(&reference.key_path));
                }
                Err(error) => {
                    entry.insert("error".into(), Value::from(error.to_string()));
                }
            }
            Value::Object(entry)
        })
        .collect();

    let mut value = Object::new();
    value.insert("lookups".into(), Value::from(lookups));
    value.insert("actions".into(), Value::from(actions));
    output(&cli.output, &Value::Object(value))
}

fn reference_path(path: &[stratum::key_path::PathSegment]) -> Value {
    Value::from(stratum::key_path::render_key_path(path))
}

fn options(args: &cli::EvaluationArgs) -> EvaluateOptions {
    EvaluateOptions {
        allow_partial: args.allow_partial,
        unescape: !args.keep_escapes,
        source: None,
    }
}

/// Project context, overlaid by `--context` files
fn root_context(args: &cli::ContextArgs) -> anyhow::Result<LayeredContext> {
    let mut variables = args
        .var_files
        .iter()
        .map(|path| load_document(Some(path)))
        .collect::<anyhow::Result<Vec<TemplateNode>>>()?;

    if !args.vars.is_empty() {
        let mut overrides = Value::Object(Object::new());
        for var in &args.vars {
            overrides = overrides.deep_merge(parse_var(var)?);
        }
        variables.push(parse_template_collection(overrides, &SourceInfo::default())?);
    }

    let project = project_context(ProjectContextParams {
        project_name: args.project.clone(),
        environment: args.environment.clone(),
        namespace: args.namespace.clone(),
        variables,
        ..Default::default()
    })?;

    let mut context = LayeredContext::new().with_layer(Arc::new(project));
    for path in &args.context_files {
        let data = read_data(Some(path))?;
        let layer: Arc<dyn Context> = Arc::new(GenericContext::from_value(data, &document_source(Some(path)))?);
        context = context.with_layer(layer);
    }

    tracing::debug!(layers = context.len(), "Built root context");
    Ok(context)
}

/// `a.b=value` as `{a: {b: value}}`, the value parsed as YAML
fn parse_var(var: &str) -> anyhow::Result<Value> {
    let Some((key, raw)) = var.split_once('=') else {
        anyhow::bail!("Invalid variable '{var}', expected KEY=VALUE");
    };
    let path = parse_dotted(key);
    anyhow::ensure!(!path.is_empty(), "Invalid variable '{var}', the key is empty");

    let value = match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(value) if !raw.trim().is_empty() => Value::from(value),
        _ => Value::from(raw),
    };

    Ok(path.iter().rev().fold(value, |value, segment| {
        let mut object = Object::new();
        object.insert(segment.as_key().into_owned(), value);
        Value::Object(object)
    }))
}

fn document_source(path: Option<&Path>) -> SourceInfo {
    SourceInfo::new(path.map(PathBuf::from), vec![])
}

/// YAML (or JSON) from `path`, stdin if `None`
fn read_data(path: Option<&Path>) -> anyhow::Result<Value> {
    use anyhow::Context;

    let text = match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin())?,
    };

    let data: serde_yaml::Value = serde_yaml::from_str(&text).with_context(|| match path {
        Some(path) => format!("Failed to parse {}", path.display()),
        None => "Failed to parse stdin".to_string(),
    })?;
    Ok(data.into())
}

fn load_document(path: Option<&Path>) -> anyhow::Result<TemplateNode> {
    let data = read_data(path)?;
    Ok(parse_template_collection(data, &document_source(path))?)
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (stratum-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Functions => {
            for function in stratum::functions::FUNCTIONS {
                let arguments: Vec<String> = function
                    .arguments
                    .iter()
                    .map(|argument| match argument.required {
                        true => argument.name.to_string(),
                        false => format!("{}?", argument.name),
                    })
                    .collect();
                println!("{}({}): {}", function.name, arguments.join(", "), function.description);
            }
        }
        Ast { template } => {
            let parsed = stratum::template::parse_template(&template)?;
            println!("{parsed:#?}")
        }
        Templates { file } => {
            let node = load_document(file.as_deref())?;
            println!("{node:#?}")
        }
    }

    Ok(())
}
