//! Per-language configuration.
//!
//! Two layers: [`Config`] mirrors the JSON document exactly as authored
//! (every language field optional), and [`LanguageConfig`] is the validated
//! view a pipeline run works from, with mandatory fields present and every
//! pattern compiled. Validation is the single place that knows which fields
//! are required, so a missing one fails before any external service runs.
use std::path::{Path, PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::rewrite::{CustomMapping, Pattern, Rule};
use crate::schema::reserved::{EscapeRule, ReservedWords, DEFAULT_PREFIX};
use crate::schema::union::{UnionInstruction, MARKER};
use crate::schema::Envelope;

pub const DEFAULT_CONFIG_PATH: &str = "config/quicktypeConfig.json";

// ————————————————————————————————————————————————————————————————————————————
// DOCUMENT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub schema: SchemaSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSettings>,
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub languages: IndexMap<String, RawLanguage>,
}

/// Envelope and artifact location for the schemas written per language.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaSettings {
    pub title: String,
    pub id: String,
    pub draft: String,
    pub top_level_type: String,
    pub output_dir: PathBuf,
}

/// Where the extracted schema comes from: a file, or a command printing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    pub schema_file: Option<PathBuf>,
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorSettings {
    pub program: String,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RendererValue {
    Bool(bool),
    Text(String),
}

/// Passed through to the generator untouched.
pub type RendererOptions = IndexMap<String, RendererValue>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLanguage {
    pub renderer_options: Option<RendererOptions>,
    pub processing: Option<RawProcessing>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProcessing {
    pub output_dir: Option<PathBuf>,
    pub escape_prefix: Option<String>,
    pub reserved_words: Option<Vec<String>>,
    pub property_regex: Option<RawRule>,
    pub custom_mapping: Option<RawCustomMapping>,
    pub union_type: Option<RawUnion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRule {
    pub pattern: Option<String>,
    pub flags: Option<String>,
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPattern {
    pub pattern: Option<String>,
    pub flags: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCustomMapping {
    pub import_anchor: Option<RawPattern>,
    pub custom_types: Option<Vec<String>>,
    pub type_mappings: Option<Vec<RawTypeMapping>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTypeMapping {
    pub from_type: Option<RawPattern>,
    pub to_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawUnion {
    pub enabled: Option<bool>,
    pub template: Option<String>,
    pub separator: Option<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// VALIDATED
// ————————————————————————————————————————————————————————————————————————————

/// Everything one language's pipeline run needs, already checked.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub id: String,
    pub renderer_options: RendererOptions,
    pub output_path: PathBuf,
    pub reserved: ReservedWords,
    pub escape: EscapeRule,
    pub restore: Rule,
    pub custom: Option<CustomMapping>,
    pub union: UnionInstruction,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            title: "SignalWireML".into(),
            id: "SignalWireML".into(),
            draft: "http://json-schema.org/draft-07/schema#".into(),
            top_level_type: "Instruction".into(),
            output_dir: PathBuf::from("schema"),
        }
    }
}

impl SchemaSettings {
    pub fn envelope(&self) -> Envelope<'_> {
        Envelope {
            title: &self.title,
            id: &self.id,
            draft: &self.draft,
            top_level: &self.top_level_type,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self { program: "quicktype".into(), extra_args: Vec::new() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ResourceNotFound {
                what: "configuration file",
                path: path.to_path_buf(),
            });
        }
        let source = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Self::from_json(&source).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            }
            .into(),
            other => other.into(),
        })
    }

    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        crate::path_de::from_str_with_path(source).map_err(|err| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: err.to_string(),
        })
    }

    pub fn language_ids(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    pub fn language(&self, id: &str) -> Result<LanguageConfig, ConfigError> {
        let raw = self
            .languages
            .get(id)
            .ok_or_else(|| ConfigError::UnknownLanguage(id.to_string()))?;
        raw.validate(id)
    }
}

impl RawLanguage {
    pub fn validate(&self, language: &str) -> Result<LanguageConfig, ConfigError> {
        let processing = self
            .processing
            .as_ref()
            .ok_or_else(|| ConfigError::missing(language, "processing"))?;
        let output_path = processing
            .output_dir
            .clone()
            .ok_or_else(|| ConfigError::missing(language, "processing.outputDir"))?;
        let property_regex = processing
            .property_regex
            .as_ref()
            .ok_or_else(|| ConfigError::missing(language, "processing.propertyRegex"))?;
        let renderer_options = self
            .renderer_options
            .clone()
            .ok_or_else(|| ConfigError::missing(language, "rendererOptions"))?;

        let escape = match processing.escape_prefix.as_deref() {
            None => EscapeRule::new(DEFAULT_PREFIX),
            Some("") => {
                return Err(ConfigError::InvalidValue {
                    language: language.into(),
                    field: "processing.escapePrefix".into(),
                    reason: "must not be empty".into(),
                });
            }
            Some(prefix) => EscapeRule::new(prefix),
        };

        let reserved = processing
            .reserved_words
            .iter()
            .flatten()
            .cloned()
            .collect::<ReservedWords>();
        if let Some(word) = reserved.iter().find(|word| escape.is_escaped(word)) {
            return Err(ConfigError::InvalidValue {
                language: language.into(),
                field: "processing.reservedWords".into(),
                reason: format!("'{word}' already carries the escape prefix '{}'", escape.marker()),
            });
        }

        let restore = property_regex.compile(language, "processing.propertyRegex")?;
        let custom = processing
            .custom_mapping
            .as_ref()
            .map(|raw| raw.validate(language))
            .transpose()?;
        let union = match &processing.union_type {
            Some(raw) => raw.validate(language)?,
            None => UnionInstruction {
                enabled: false,
                template: String::new(),
                separator: String::new(),
            },
        };

        Ok(LanguageConfig {
            id: language.to_string(),
            renderer_options,
            output_path,
            reserved,
            escape,
            restore,
            custom,
            union,
        })
    }
}

impl RawRule {
    fn compile(&self, language: &str, field: &str) -> Result<Rule, ConfigError> {
        let pattern = required(&self.pattern, language, field, "pattern")?;
        let flags = required(&self.flags, language, field, "flags")?;
        let replacement = required(&self.replacement, language, field, "replacement")?;
        Rule::compile(pattern, flags, replacement).map_err(|source| ConfigError::InvalidRule {
            language: language.into(),
            field: field.into(),
            source,
        })
    }
}

impl RawCustomMapping {
    fn validate(&self, language: &str) -> Result<CustomMapping, ConfigError> {
        let declarations = self.custom_types.clone().unwrap_or_default();
        let anchor = match &self.import_anchor {
            Some(raw) => {
                let field = "processing.customMapping.importAnchor";
                let pattern = required(&raw.pattern, language, field, "pattern")?;
                let flags = raw.flags.as_deref().unwrap_or("");
                Some(Pattern::compile(pattern, flags).map_err(|source| ConfigError::InvalidRule {
                    language: language.into(),
                    field: field.into(),
                    source,
                })?)
            }
            None if !declarations.is_empty() => {
                return Err(ConfigError::missing(language, "processing.customMapping.importAnchor"));
            }
            None => None,
        };

        let substitutions = self
            .type_mappings
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, mapping)| {
                let field = format!("processing.customMapping.typeMappings[{i}]");
                let from = mapping
                    .from_type
                    .as_ref()
                    .ok_or_else(|| ConfigError::missing(language, format!("{field}.fromType")))?;
                let to = mapping
                    .to_type
                    .as_ref()
                    .ok_or_else(|| ConfigError::missing(language, format!("{field}.toType")))?;
                RawRule {
                    pattern: from.pattern.clone(),
                    flags: from.flags.clone(),
                    replacement: Some(to.clone()),
                }
                .compile(language, &format!("{field}.fromType"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CustomMapping { anchor, declarations, substitutions })
    }
}

impl RawUnion {
    fn validate(&self, language: &str) -> Result<UnionInstruction, ConfigError> {
        let field = "processing.unionType";
        if !self.enabled.unwrap_or(false) {
            return Ok(UnionInstruction {
                enabled: false,
                template: self.template.clone().unwrap_or_default(),
                separator: self.separator.clone().unwrap_or_default(),
            });
        }
        let template = required(&self.template, language, field, "template")?;
        let separator = required(&self.separator, language, field, "separator")?;
        if !template.contains(MARKER) {
            return Err(ConfigError::InvalidValue {
                language: language.into(),
                field: format!("{field}.template"),
                reason: format!("template has no '{MARKER}' marker"),
            });
        }
        Ok(UnionInstruction {
            enabled: true,
            template: template.to_string(),
            separator: separator.to_string(),
        })
    }
}

fn required<'a>(value: &'a Option<String>, language: &str, parent: &str, field: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::missing(language, format!("{parent}.{field}")))
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
