#![warn(missing_docs)]
//! Uniform proxies for the external tools of the gecko / web-platform-tests
//! workflow, and scripted mocks standing in for them in tests.
//!
//! Every proxy implements [`Tool`]: `run` for an explicit argument list, and
//! [`ToolExt::op`] to obtain any subcommand by name without declaring it first.
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod invoker;
pub mod mock;
pub mod output;
pub mod telemetry;
pub mod tools;
pub use cache::{CleanupPolicy, WptCache};
pub use command::{Command, Subcommand, Tool, ToolExt};
pub use config::{AppConfig, Args};
pub use error::CommandError;
pub use invoker::{ProcessInvoker, SystemInvoker};
pub use mock::{create_mock, MockCommand, MockRegistry, MockTool};
pub use output::{InvokeOptions, Output, StderrMode};
pub use telemetry::{FailureRecord, JsonFileSink, TelemetrySink, TracingSink};
pub use tools::{find_url, Mach, MozPhab, Wpt};

/// Setup logging to stderr, stdout being reserved to the tool output
/// (Tracing is a bit more involving to set up but will provide much more feature if needed)
pub fn setup_tracing(level_filter: &str) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_new(level_filter).context("Initializing log filter")?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
    Ok(())
}

/// Sink receiving failure records according to `config`.
pub fn telemetry_sink(config: &AppConfig) -> Arc<dyn TelemetrySink> {
    match &config.telemetry_file {
        Some(path) => Arc::new(JsonFileSink::new(path)),
        None => Arc::new(TracingSink),
    }
}

/// Proxy for the tool called `name`, rooted at the configured directory.
///
/// `mach`, `wpt` and `moz-phab` get their dedicated proxy, any other name a
/// plain [`Command`].
pub fn build_tool(name: &str, config: &AppConfig, sink: Arc<dyn TelemetrySink>) -> Box<dyn Tool> {
    match name {
        "mach" => {
            let mut mach = Mach::new(&config.root)
                .with_cleanup_policy(config.cleanup_failure)
                .with_sink(sink);
            if let Some(cache) = &config.wpt_cache {
                mach = mach.with_cache(WptCache::new(cache));
            }
            Box::new(mach)
        }
        "wpt" => Box::new(Wpt::new(&config.root).with_sink(sink)),
        "moz-phab" => Box::new(MozPhab::new(&config.root).with_sink(sink)),
        other => Box::new(Command::new(other, &config.root).with_sink(sink)),
    }
}

/// Run `command` (subcommand then arguments) on `tool`.
///
/// With `review_url_only`, the output is replaced by the last review URL it
/// contains, or nothing.
pub fn run_command(
    tool: &dyn Tool,
    command: &[String],
    options: &InvokeOptions,
    review_url_only: bool,
) -> Result<Output, CommandError> {
    let Some((subcommand, rest)) = command.split_first() else {
        return Err(CommandError::MissingSubcommand {
            command: tool.name().to_owned(),
        });
    };
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    let output = tool.op(subcommand).call_with(&rest, options)?;
    if !review_url_only {
        return Ok(output);
    }
    Ok(find_url(&output.to_string_lossy())
        .map(|url| Output::from(format!("{url}\n")))
        .unwrap_or_default())
}

#[cfg(test)]
mod build_tool_should {
    use super::*;
    use std::path::{Path, PathBuf};
    use test_log::test; // Automatically trace tests

    fn config() -> AppConfig {
        AppConfig {
            root: PathBuf::from("/src/gecko"),
            options: InvokeOptions::default(),
            cleanup_failure: CleanupPolicy::Fail,
            wpt_cache: Some(PathBuf::from("/tmp/cache/wpt")),
            telemetry_file: None,
            log_filter: "Warn".into(),
        }
    }

    #[test]
    fn pick_proxy_by_name() {
        for name in ["mach", "wpt", "moz-phab", "git-cinnabar"] {
            let tool = build_tool(name, &config(), Arc::new(TracingSink));
            assert_eq!(tool.name(), name);
            assert_eq!(tool.root_path(), Path::new("/src/gecko"));
        }
    }
}

#[cfg(test)]
mod run_command_should {
    use super::*;
    use test_log::test; // Automatically trace tests

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn normalize_subcommand_and_forward_arguments() -> Result<()> {
        let registry = MockRegistry::new();
        let mach = registry.tool("mach");
        mach.set_data("try-push", "pushed");
        let gecko = mach.command("/src/gecko");
        let opts = InvokeOptions::merged();
        let out = run_command(&gecko, &strings(&["try_push", "--artifact"]), &opts, false)?;
        assert_eq!(out, "pushed");
        let log = mach.get_log();
        assert_eq!(log[0].args, vec!["try-push", "--artifact"]);
        assert_eq!(log[0].options, opts);
        Ok(())
    }

    #[test]
    fn keep_only_review_url() -> Result<()> {
        let registry = MockRegistry::new();
        let phab = registry.tool("moz-phab");
        phab.set_data(
            "submit",
            "D111 https://phabricator.services.mozilla.com/D111\n\
             D222 https://phabricator.services.mozilla.com/D222\n",
        );
        let tool = phab.command("/src/gecko");
        let url = run_command(&tool, &strings(&["submit"]), &InvokeOptions::default(), true)?;
        assert_eq!(url, "https://phabricator.services.mozilla.com/D222\n");

        phab.set_data("submit", "nothing to submit");
        let url = run_command(&tool, &strings(&["submit"]), &InvokeOptions::default(), true)?;
        assert!(url.is_empty());
        Ok(())
    }

    #[test]
    fn refuse_missing_subcommand() {
        let registry = MockRegistry::new();
        let tool = registry.tool("wpt").command("/wpt");
        assert!(matches!(
            run_command(&tool, &[], &InvokeOptions::default(), false),
            Err(CommandError::MissingSubcommand { .. })
        ));
    }
}
