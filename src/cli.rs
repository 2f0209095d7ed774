//! Command line: generate SDK sources, inspect the escaped schema, list languages.
use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::pipeline::{Pipeline, RunReport, Target};
use crate::service::{extractor_for, QuicktypeCli};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate SWML SDK sources from the type model's JSON schema, one target language at a time
#[derive(Parser, Debug)]
#[command(name = "swml-sdk-gen", version)]
pub struct CommandLineInterface {
    /// more logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run the full pipeline for one language, or '*' for every configured language
    Generate(GenerateOut),
    /// print the escaped schema that would be handed to the generator
    Schema(SchemaOut),
    /// list configured languages and whether their configuration validates
    Languages(LanguagesOut),
}

#[derive(Args, Debug, Clone)]
struct ConfigSettings {
    /// per-language configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// read the extracted schema from this file instead of the configured source
    #[arg(long)]
    schema: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct GenerateOut {
    /// language id, or '*'
    target: Target,

    #[command(flatten)]
    config_settings: ConfigSettings,

    /// run up to N languages at once in '*' mode
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    language: String,

    #[command(flatten)]
    config_settings: ConfigSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct LanguagesOut {
    /// per-language configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl ConfigSettings {
    fn load(&self) -> anyhow::Result<Config> {
        Config::load(&self.config).with_context(|| format!("loading {}", self.config.display()))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
    pub fn run(&self) -> anyhow::Result<ExitCode> {
        match &self.cmd {
            Command::Generate(target) => {
                let config = target.config_settings.load()?;
                let extractor = extractor_for(&config, target.config_settings.schema.as_deref())?;
                let generator = QuicktypeCli::from_config(&config);
                let report = Pipeline::new(&config, extractor.as_ref(), &generator)
                    .with_jobs(target.jobs)
                    .run(&target.target)?;
                print_report(&report);
                Ok(if report.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
            Command::Schema(target) => {
                let config = target.config_settings.load()?;
                let language = config.language(&target.language)?;
                let extractor = extractor_for(&config, target.config_settings.schema.as_deref())?;
                let generator = QuicktypeCli::from_config(&config);
                let prepared = Pipeline::new(&config, extractor.as_ref(), &generator).prepare(&language)?;
                let schema_src = serde_json::to_string_pretty(&prepared.escaped.to_value())?;
                if let Some(out) = target.out.as_ref() {
                    crate::pipeline::write_atomic(out, schema_src.as_bytes())?;
                    eprintln!(
                        "{} {} ({} properties escaped)",
                        "wrote".green(),
                        out.display(),
                        prepared.escaped_properties
                    );
                } else {
                    println!("{schema_src}");
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::Languages(target) => {
                let config = Config::load(&target.config)
                    .with_context(|| format!("loading {}", target.config.display()))?;
                let mut all_valid = true;
                for id in config.language_ids() {
                    match config.language(id) {
                        Ok(language) => println!(
                            "{} {id} → {}",
                            "✓".green(),
                            language.output_path.display()
                        ),
                        Err(error) => {
                            all_valid = false;
                            println!("{} {id}: {error}", "✗".red());
                        }
                    }
                }
                Ok(if all_valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn print_report(report: &RunReport) {
    for artifacts in report.succeeded() {
        eprintln!(
            "{} {}: {} ({} lines, {} escaped, {} union members)",
            "✓".green().bold(),
            artifacts.language,
            artifacts.source_path.display(),
            artifacts.lines,
            artifacts.escaped_properties,
            artifacts.union_members,
        );
    }
    for (language, error) in report.failed() {
        eprintln!("{} {language}: {error}", "✗".red().bold());
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_accepts_star_and_jobs() {
        let cli = CommandLineInterface::try_parse_from(["swml-sdk-gen", "-vv", "generate", "*", "--jobs", "4"]).unwrap();
        assert_eq!(cli.verbosity(), 2);
        match cli.cmd {
            Command::Generate(out) => {
                assert_eq!(out.target, Target::All);
                assert_eq!(out.jobs, 4);
                assert_eq!(out.config_settings.config, PathBuf::from(DEFAULT_CONFIG_PATH));
                assert!(out.config_settings.schema.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn schema_command_takes_overrides() {
        let cli = CommandLineInterface::try_parse_from([
            "swml-sdk-gen", "schema", "python", "--config", "c.json", "--schema", "s.json", "-o", "out.json",
        ])
        .unwrap();
        let Command::Schema(out) = cli.cmd else { panic!("expected schema command") };
        assert_eq!(out.language, "python");
        assert_eq!(out.config_settings.schema, Some(PathBuf::from("s.json")));
        assert_eq!(out.out, Some(PathBuf::from("out.json")));
    }
}
