//! Seams to the two external collaborators.
//!
//! Schema extraction and code generation are opaque, atomic steps from the
//! pipeline's point of view. The adapters here either read a file or spawn a
//! process and capture its stdout; any failure is reported, never masked.
use std::path::{Path, PathBuf};
use std::process::Command;
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, RendererOptions, RendererValue};
use crate::error::{Error, Result, ServiceError};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Produces the raw JSON Schema for the type model.
pub trait SchemaExtractor: Send + Sync {
    fn extract(&self, type_name: &str) -> Result<Value>;
}

/// Everything the generator is given for one language.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub language: &'a str,
    pub top_level: &'a str,
    /// The escaped schema, already persisted at `schema_path`.
    pub schema: &'a Value,
    pub schema_path: &'a Path,
    pub renderer_options: &'a RendererOptions,
}

/// Turns a schema into source lines for one target language.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<Vec<String>>;
}

/// Reads a schema that was extracted ahead of time.
#[derive(Debug, Clone)]
pub struct FileExtractor {
    path: PathBuf,
}

/// Runs a command (e.g. `npx ts-json-schema-generator ...`) and parses its
/// stdout. Any argument equal to `{type}` is replaced by the type name.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    argv: Vec<String>,
}

/// The `quicktype` command line.
#[derive(Debug, Clone)]
pub struct QuicktypeCli {
    program: String,
    extra_args: Vec<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl FileExtractor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchemaExtractor for FileExtractor {
    fn extract(&self, _type_name: &str) -> Result<Value> {
        if !self.path.exists() {
            return Err(Error::ResourceNotFound {
                what: "schema source",
                path: self.path.clone(),
            });
        }
        let source = std::fs::read_to_string(&self.path).map_err(|err| Error::io(&self.path, err))?;
        serde_json::from_str(&source).map_err(|err| {
            ServiceError::InvalidOutput {
                program: self.path.display().to_string(),
                reason: err.to_string(),
            }
            .into()
        })
    }
}

impl CommandExtractor {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl SchemaExtractor for CommandExtractor {
    fn extract(&self, type_name: &str) -> Result<Value> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(ServiceError::NoSource.into());
        };
        let args = args
            .iter()
            .map(|arg| if arg == "{type}" { type_name.to_string() } else { arg.clone() })
            .collect::<Vec<_>>();
        let stdout = run(program, &args)?;
        serde_json::from_str(&stdout).map_err(|err| {
            ServiceError::InvalidOutput {
                program: program.clone(),
                reason: err.to_string(),
            }
            .into()
        })
    }
}

/// Pick the extractor: an explicit `--schema` file wins over the config.
pub fn extractor_for(config: &Config, schema_override: Option<&Path>) -> Result<Box<dyn SchemaExtractor>> {
    if let Some(path) = schema_override {
        return Ok(Box::new(FileExtractor::new(path)));
    }
    let source = config.source.as_ref();
    if let Some(path) = source.and_then(|s| s.schema_file.as_ref()) {
        return Ok(Box::new(FileExtractor::new(path)));
    }
    match source.and_then(|s| s.command.as_ref()) {
        Some(argv) if !argv.is_empty() => Ok(Box::new(CommandExtractor::new(argv.clone()))),
        _ => Err(ServiceError::NoSource.into()),
    }
}

impl QuicktypeCli {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self { program: program.into(), extra_args }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.generator.program.clone(), config.generator.extra_args.clone())
    }

    /// `--src-lang schema --lang <l> --top-level <t> [options] [extra] <file>`
    pub fn arguments(&self, request: &GenerationRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "--src-lang".to_string(),
            "schema".to_string(),
            "--lang".to_string(),
            request.language.to_string(),
            "--top-level".to_string(),
            request.top_level.to_string(),
        ];
        for (name, value) in request.renderer_options {
            match value {
                RendererValue::Bool(true) => args.push(format!("--{name}")),
                RendererValue::Bool(false) => args.push(format!("--no-{name}")),
                RendererValue::Text(text) => {
                    args.push(format!("--{name}"));
                    args.push(text.clone());
                }
            }
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(request.schema_path.display().to_string());
        args
    }
}

impl CodeGenerator for QuicktypeCli {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<Vec<String>> {
        if !request.schema_path.exists() {
            return Err(Error::ResourceNotFound {
                what: "intermediate schema",
                path: request.schema_path.to_path_buf(),
            });
        }
        let stdout = run(&self.program, &self.arguments(request))?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn run(program: &str, args: &[String]) -> Result<String> {
    debug!(program, ?args, "spawning external service");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ServiceError::Spawn { program: program.to_string(), source })?;
    if !output.status.success() {
        return Err(ServiceError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    String::from_utf8(output.stdout).map_err(|err| {
        ServiceError::InvalidOutput {
            program: program.to_string(),
            reason: err.to_string(),
        }
        .into()
    })
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceSettings;
    use serde_json::json;

    #[test]
    fn quicktype_arguments_follow_renderer_options() {
        let mut options = RendererOptions::new();
        options.insert("python-version".into(), RendererValue::Text("3.7".into()));
        options.insert("just-types".into(), RendererValue::Bool(true));
        options.insert("nice-property-names".into(), RendererValue::Bool(false));
        let schema = json!({});
        let request = GenerationRequest {
            language: "python",
            top_level: "Instruction",
            schema: &schema,
            schema_path: Path::new("schema/python/postProcess.json"),
            renderer_options: &options,
        };
        let cli = QuicktypeCli::new("quicktype", vec!["--quiet".into()]);
        assert_eq!(
            cli.arguments(&request),
            [
                "--src-lang", "schema", "--lang", "python", "--top-level", "Instruction",
                "--python-version", "3.7", "--just-types", "--no-nice-property-names",
                "--quiet", "schema/python/postProcess.json",
            ]
        );
    }

    #[test]
    fn missing_schema_file_is_resource_not_found() {
        let err = FileExtractor::new("/nonexistent/types.json").extract("Instruction").unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { what: "schema source", .. }));
    }

    #[test]
    fn file_extractor_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        std::fs::write(&path, r#"{ "definitions": {} }"#).unwrap();
        let value = FileExtractor::new(&path).extract("Instruction").unwrap();
        assert_eq!(value, json!({ "definitions": {} }));
    }

    #[test]
    fn schema_override_beats_config_source() {
        let mut config = Config::default();
        assert!(matches!(extractor_for(&config, None), Err(Error::Service(ServiceError::NoSource))));
        config.source = Some(SourceSettings { schema_file: None, command: Some(vec!["cat".into()]) });
        assert!(extractor_for(&config, None).is_ok());
        assert!(extractor_for(&config, Some(Path::new("x.json"))).is_ok());
    }

    #[test]
    fn spawning_a_missing_program_is_reported() {
        let err = CommandExtractor::new(vec!["definitely-not-a-real-program-4f2a".into()])
            .extract("Instruction")
            .unwrap_err();
        assert!(matches!(err, Error::Service(ServiceError::Spawn { .. })));
    }
}
