//! stratum cli interface

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; stratum ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve all templates of a YAML or JSON document
    ///
    /// Reads the document from stdin unless a file is given
    Resolve(ResolveCommand),

    /// Resolve a single template string
    #[command(alias = "eval")]
    Evaluate(EvaluateCommand),

    /// List the context keys a document references, without resolving it
    References(ReferencesCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ResolveCommand {
    #[clap(flatten)]
    pub context: ContextArgs,

    #[clap(flatten)]
    pub evaluation: EvaluationArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// YAML or JSON document, stdin if omitted
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct EvaluateCommand {
    #[clap(flatten)]
    pub context: ContextArgs,

    #[clap(flatten)]
    pub evaluation: EvaluationArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Template string to resolve, e.g. '${var.name}'
    pub template: String,
}

#[derive(Parser, Debug)]
pub struct ReferencesCommand {
    #[clap(flatten)]
    pub context: ContextArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// YAML or JSON document, stdin if omitted
    pub file: Option<PathBuf>,
}

/// What templates are resolved against
#[derive(Args, Debug)]
pub struct ContextArgs {
    /// Additional context data (YAML or JSON)
    ///
    /// Can be specified multiple times, later files take precedence.
    /// Top level keys become context keys, e.g. `${my-key.value}`.
    #[clap(long = "context")]
    pub context_files: Vec<PathBuf>,

    /// Load variables from a file, available as `${var.*}`
    ///
    /// Can be specified multiple times, later files take precedence.
    #[clap(long = "var-file")]
    pub var_files: Vec<PathBuf>,

    /// Set a variable, e.g. `--var image.tag=v1`
    ///
    /// Takes precedence over variable files. Values are parsed as YAML.
    #[clap(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Project name, available as `${project.name}`
    #[clap(long = "project", default_value = "project")]
    pub project: String,

    /// Environment name, available as `${environment.name}`
    #[clap(long = "environment", default_value = "default")]
    pub environment: String,

    /// Namespace of the environment, available as `${environment.namespace}`
    #[clap(long = "namespace")]
    pub namespace: Option<String>,
}

#[derive(Args, Debug)]
pub struct EvaluationArgs {
    /// Keep templates referencing unknown keys instead of failing
    #[clap(long = "allow-partial")]
    pub allow_partial: bool,

    /// Output escaped templates (`$${...}`) as they are
    #[clap(long = "keep-escapes")]
    pub keep_escapes: bool,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// List helper functions and their arguments
    Functions,
    /// Print the parsed form of a template string
    Ast { template: String },
    /// Print the template tree of a document
    Templates { file: Option<PathBuf> },
}
