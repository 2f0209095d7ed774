use std::process::ExitCode;
use colored::Colorize;
use swml_sdk_gen::cli::CommandLineInterface;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "swml_sdk_gen=info",
        1 => "swml_sdk_gen=debug",
        _ => "swml_sdk_gen=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);
    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn main() -> ExitCode {
    let command_line_interface = CommandLineInterface::load();
    init_tracing(command_line_interface.verbosity());
    match command_line_interface.run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
