use std::path::Path;

use serde::Serialize;
use stratum_core::commands::{self, ShowReport};
use stratum_core::{ManagerOptions, SchemaRegistry};

use crate::cli::OutputFormat;

const ENVELOPE_SCHEMA: &str = "stratum-cli/config-output/v1";

pub struct Renderer {
    output_format: OutputFormat,
}

impl Renderer {
    pub fn new(output_format: OutputFormat) -> Self {
        Self { output_format }
    }

    pub fn render_show(&self, report: &ShowReport) -> stratum_core::Result<()> {
        match self.output_format {
            OutputFormat::Json => print_json_envelope("show", report),
            OutputFormat::Text => {
                print!("{}", report.render(commands::OutputFormat::Text)?);
                Ok(())
            }
            OutputFormat::Yaml => {
                print!("{}", report.render(commands::OutputFormat::Yaml)?);
                Ok(())
            }
        }
    }

    pub fn render_list(
        &self,
        registry: &SchemaRegistry,
        options: &ManagerOptions,
    ) -> stratum_core::Result<()> {
        match self.output_format {
            OutputFormat::Json => {
                print_json_envelope("list", &commands::list_report(registry, options))
            }
            OutputFormat::Text => {
                print!("{}", commands::list(registry, options, commands::OutputFormat::Text)?);
                Ok(())
            }
            OutputFormat::Yaml => {
                print!("{}", commands::list(registry, options, commands::OutputFormat::Yaml)?);
                Ok(())
            }
        }
    }

    pub fn render_init(&self, schema: &str, path: &Path) -> stratum_core::Result<()> {
        match self.output_format {
            OutputFormat::Json => print_json_envelope(
                "init",
                &InitData {
                    schema,
                    path: path.display().to_string(),
                },
            ),
            OutputFormat::Text | OutputFormat::Yaml => {
                println!("wrote {schema} template to {}", path.display());
                Ok(())
            }
        }
    }

    /// Failures go to stderr as one line; JSON output gets an error envelope
    /// on stdout instead.
    pub fn render_error(&self, command: &str, error: &stratum_core::Error) {
        if self.output_format == OutputFormat::Json
            && print_json_error_envelope(command, error).is_ok()
        {
            return;
        }
        eprintln!("stratum: {error}");
    }
}

fn print_json_envelope<T: Serialize>(command: &str, data: &T) -> stratum_core::Result<()> {
    let envelope = CliJsonEnvelope {
        schema: ENVELOPE_SCHEMA,
        status: "ok",
        command,
        data,
    };
    println!("{}", serde_json::to_string(&envelope)?);
    Ok(())
}

fn print_json_error_envelope(command: &str, error: &stratum_core::Error) -> stratum_core::Result<()> {
    let envelope = CliJsonErrorEnvelope {
        schema: ENVELOPE_SCHEMA,
        status: "error",
        command,
        error: CliJsonErrorPayload {
            code: error.code(),
            exit_code: error.exit_code(),
            message: error.to_string(),
        },
    };
    println!("{}", serde_json::to_string(&envelope)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct CliJsonEnvelope<'a, T: Serialize> {
    schema: &'a str,
    status: &'a str,
    command: &'a str,
    data: &'a T,
}

#[derive(Debug, Serialize)]
struct CliJsonErrorEnvelope<'a> {
    schema: &'a str,
    status: &'a str,
    command: &'a str,
    error: CliJsonErrorPayload,
}

#[derive(Debug, Serialize)]
struct CliJsonErrorPayload {
    code: &'static str,
    exit_code: i32,
    message: String,
}

#[derive(Debug, Serialize)]
struct InitData<'a> {
    schema: &'a str,
    path: String,
}
