//! Per-language orchestration.
//!
//! ```text
//! extract → persist raw → envelope → escape → check → persist escaped
//!         → generate → rewrite (+ union) → write source → restore → persist final
//! ```
//!
//! Each language runs independently; in `*` mode a failure is recorded in
//! the [`RunReport`] and the remaining languages still run.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, error, info, info_span};

use crate::config::{Config, LanguageConfig};
use crate::error::{ConfigError, Error, Result};
use crate::rewrite::CodeRewriter;
use crate::schema::{reserved, union, Schema};
use crate::service::{CodeGenerator, GenerationRequest, SchemaExtractor};

pub const RAW_SCHEMA_FILE: &str = "generated-schema.json";
pub const ESCAPED_SCHEMA_FILE: &str = "postProcess.json";
pub const FINAL_SCHEMA_FILE: &str = "final.schema.json";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Language(String),
}

pub struct Pipeline<'a> {
    config: &'a Config,
    extractor: &'a dyn SchemaExtractor,
    generator: &'a dyn CodeGenerator,
    jobs: usize,
}

/// The escaped schema, ready for the generator.
#[derive(Debug, Clone)]
pub struct PreparedSchema {
    pub raw: Value,
    pub escaped: Schema,
    pub escaped_properties: usize,
}

/// What one successful language run wrote.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub language: String,
    pub source_path: PathBuf,
    pub raw_schema_path: PathBuf,
    pub escaped_schema_path: PathBuf,
    pub final_schema_path: PathBuf,
    pub escaped_properties: usize,
    pub union_members: usize,
    pub lines: usize,
}

#[derive(Debug)]
pub struct Outcome {
    pub language: String,
    pub result: Result<Artifacts>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl FromStr for Target {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "*" => Self::All,
            other => Self::Language(other.to_string()),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Language(id) => f.write_str(id),
        }
    }
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &Artifacts> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }
    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.language.as_str(), e)))
    }
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, extractor: &'a dyn SchemaExtractor, generator: &'a dyn CodeGenerator) -> Self {
        Self { config, extractor, generator, jobs: 1 }
    }

    /// More than one job runs languages on a dedicated rayon pool.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// A single unknown language is a hard error; everything else ends up
    /// in the report.
    pub fn run(&self, target: &Target) -> Result<RunReport> {
        let ids = match target {
            Target::All => self.config.language_ids().map(str::to_string).collect::<Vec<_>>(),
            Target::Language(id) => {
                if !self.config.languages.contains_key(id) {
                    return Err(ConfigError::UnknownLanguage(id.clone()).into());
                }
                vec![id.clone()]
            }
        };
        info!(target = %target, languages = ids.len(), "starting generation");

        let run_one = |id: &String| Outcome {
            language: id.clone(),
            result: self.run_language(id),
        };
        let outcomes = if self.jobs > 1 && ids.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build()?;
            pool.install(|| ids.par_iter().map(run_one).collect::<Vec<_>>())
        } else {
            ids.iter().map(run_one).collect::<Vec<_>>()
        };

        for outcome in &outcomes {
            if let Err(err) = &outcome.result {
                error!(language = %outcome.language, error = %err, "generation failed");
            }
        }
        Ok(RunReport { outcomes })
    }

    pub fn run_language(&self, id: &str) -> Result<Artifacts> {
        let _span = info_span!("language", language = id).entered();
        let language = self.config.language(id)?;
        let schema_dir = self.schema_dir(id);
        let raw_schema_path = schema_dir.join(RAW_SCHEMA_FILE);
        let escaped_schema_path = schema_dir.join(ESCAPED_SCHEMA_FILE);
        let final_schema_path = schema_dir.join(FINAL_SCHEMA_FILE);

        let raw = self.extractor.extract(&self.config.schema.top_level_type)?;
        write_json(&raw_schema_path, &raw, "raw schema")?;
        let prepared = self.prepare_value(raw, &language)?;
        let escaped_value = prepared.escaped.to_value();
        write_json(&escaped_schema_path, &escaped_value, "escaped schema")?;

        let top_level = &self.config.schema.top_level_type;
        let lines = self.generator.generate(&GenerationRequest {
            language: id,
            top_level,
            schema: &escaped_value,
            schema_path: &escaped_schema_path,
            renderer_options: &language.renderer_options,
        })?;
        debug!(lines = lines.len(), "generator finished");

        let union_lines = union::synthesize(&prepared.escaped, top_level, &language.union);
        let union_members = if union_lines.is_empty() {
            0
        } else {
            union::union_members(&prepared.escaped, top_level).len()
        };
        let rewriter = CodeRewriter::new(language.escape.marker(), &language.restore, language.custom.as_ref());
        let lines = rewriter.rewrite(lines, union_lines);
        let mut source = lines.join("\n");
        if !source.ends_with('\n') {
            source.push('\n');
        }
        write_atomic(&language.output_path, source.as_bytes())?;

        let mut documented = prepared.escaped;
        reserved::restore(&mut documented, &language.escape, &language.restore)?;
        write_json(&final_schema_path, &documented.to_value(), "final schema")?;

        info!(output = %language.output_path.display(), "code generation completed");
        Ok(Artifacts {
            language: id.to_string(),
            source_path: language.output_path,
            raw_schema_path,
            escaped_schema_path,
            final_schema_path,
            escaped_properties: prepared.escaped_properties,
            union_members,
            lines: lines.len(),
        })
    }

    /// Extract, wrap, escape and check; no files are written.
    pub fn prepare(&self, language: &LanguageConfig) -> Result<PreparedSchema> {
        let raw = self.extractor.extract(&self.config.schema.top_level_type)?;
        self.prepare_value(raw, language)
    }

    fn prepare_value(&self, raw: Value, language: &LanguageConfig) -> Result<PreparedSchema> {
        let settings = &self.config.schema;
        let mut escaped = Schema::from_value(raw.clone())?.enveloped(&settings.envelope());

        let escaped_properties = reserved::escape(&mut escaped, &language.reserved, &language.escape)?;
        debug!(escaped_properties, reserved = language.reserved.len(), "escaped reserved words");

        if let Some(violation) = escaped.required_violations().into_iter().next() {
            return Err(violation.into());
        }
        reserved::check_round_trip(&escaped, &language.reserved, &language.escape, &language.restore)?;
        Ok(PreparedSchema { raw, escaped, escaped_properties })
    }

    pub fn schema_dir(&self, id: &str) -> PathBuf {
        self.config.schema.output_dir.join(id)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_json(path: &Path, value: &Value, what: &'static str) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| Error::Encode { what, source })?;
    text.push('\n');
    write_atomic(path, text.as_bytes())
}

/// Render fully, write beside the target, then rename over it.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&staging, contents).map_err(|err| Error::io(&staging, err))?;
    std::fs::rename(&staging, path).map_err(|err| Error::io(path, err))
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_targets_every_language() {
        assert_eq!("*".parse::<Target>().unwrap(), Target::All);
        assert_eq!("go".parse::<Target>().unwrap(), Target::Language("go".into()));
        assert_eq!(Target::All.to_string(), "*");
    }

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Generated_SDKs/go/swml.go");
        write_atomic(&path, b"package swml\n").unwrap();
        write_atomic(&path, b"package swml2\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "package swml2\n");
        let names = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["swml.go"]);
    }
}
