#![doc = include_str!("../README.md")]
use ::lib::config::Args;
use ::lib::{build_tool, run_command, setup_tracing, telemetry_sink, CommandError};
use anyhow::{Context, Result};
use std::io::Write;
use tracing::debug;

#[paw::main]
fn main(args: Args) -> Result<()> {
    let config = args.validate()?;
    setup_tracing(&config.log_filter)?;
    debug!("Configuration : {:#?}", config);

    let tool = build_tool(&args.tool, &config, telemetry_sink(&config));
    match run_command(tool.as_ref(), &args.command, &config.options, args.find_url) {
        Ok(output) => {
            std::io::stdout()
                .write_all(output.as_bytes())
                .context("Writing command output")?;
            Ok(())
        }
        Err(CommandError::Failed {
            exit_code, output, ..
        }) => {
            std::io::stderr()
                .write_all(output.as_bytes())
                .context("Writing command output")?;
            // A tool killed by a signal still has to fail.
            std::process::exit(if exit_code > 0 { exit_code } else { 1 });
        }
        Err(e) => Err(e).with_context(|| format!("Running {}", args.tool)),
    }
}
