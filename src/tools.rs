//! Proxies for the tools of the gecko / web-platform-tests workflow.
//!
//! - [`Mach`] removes the wpt cache directory after every invocation.
//! - [`Wpt`] is a plain proxy for the `wpt` frontend.
//! - [`MozPhab`] knows how to find the review URL in its output.
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::warn;

use crate::cache::{CleanupPolicy, WptCache};
use crate::command::{Command, SubcommandTable, Tool};
use crate::error::CommandError;
use crate::invoker::ProcessInvoker;
use crate::output::{InvokeOptions, Output};
use crate::telemetry::TelemetrySink;

static PHABRICATOR_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://phabricator.services.mozilla.com/D\d+").expect("valid review URL pattern")
});

/// Last Phabricator revision URL appearing in `text`, if any.
///
/// moz-phab prints the URL of every revision it touches; the last one is the
/// review that was just submitted.
/// ```
/// use lib::tools::find_url;
/// let out = "https://phabricator.services.mozilla.com/D111\n\
///            https://phabricator.services.mozilla.com/D222\n";
/// assert_eq!(find_url(out), Some("https://phabricator.services.mozilla.com/D222"));
/// assert_eq!(find_url("nothing submitted"), None);
/// ```
pub fn find_url(text: &str) -> Option<&str> {
    PHABRICATOR_URL.find_iter(text).last().map(|m| m.as_str())
}

/// Proxy for `mach`.
#[derive(Debug)]
pub struct Mach {
    command: Command,
    cache: Option<WptCache>,
    policy: CleanupPolicy,
}

impl Mach {
    /// Create a proxy for `<path>/mach`, cleaning the user's wpt cache.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let cache = WptCache::user_default();
        if cache.is_none() {
            warn!("No home directory found, wpt cache will not be cleaned");
        }
        Mach {
            command: Command::new("mach", path),
            cache,
            policy: CleanupPolicy::default(),
        }
    }

    /// Clean `cache` instead of the default one.
    pub fn with_cache(mut self, cache: WptCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// What to do when the cache cannot be removed.
    pub fn with_cleanup_policy(mut self, policy: CleanupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use another process invoker.
    pub fn with_invoker(mut self, invoker: Arc<dyn ProcessInvoker>) -> Self {
        self.command = self.command.with_invoker(invoker);
        self
    }

    /// Report failures to another sink.
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.command = self.command.with_sink(sink);
        self
    }

    /// Cache cleaned after each invocation.
    pub fn cache(&self) -> Option<&WptCache> {
        self.cache.as_ref()
    }
}

impl Tool for Mach {
    fn name(&self) -> &str {
        self.command.name()
    }

    fn root_path(&self) -> &Path {
        self.command.root_path()
    }

    fn subcommands(&self) -> &SubcommandTable {
        self.command.subcommands()
    }

    fn run_with(&self, args: &[&str], options: &InvokeOptions) -> Result<Output, CommandError> {
        let result = self.command.run_with(args, options);
        match &self.cache {
            Some(cache) => self.policy.settle(cache.path(), result, cache.clear()),
            None => result,
        }
    }
}

/// Proxy for the `wpt` frontend of a web-platform-tests checkout.
#[derive(Debug)]
pub struct Wpt {
    command: Command,
}

impl Wpt {
    /// Create a proxy for `<path>/wpt`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Wpt {
            command: Command::new("wpt", path),
        }
    }

    /// Use another process invoker.
    pub fn with_invoker(mut self, invoker: Arc<dyn ProcessInvoker>) -> Self {
        self.command = self.command.with_invoker(invoker);
        self
    }

    /// Report failures to another sink.
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.command = self.command.with_sink(sink);
        self
    }
}

impl Tool for Wpt {
    fn name(&self) -> &str {
        self.command.name()
    }

    fn root_path(&self) -> &Path {
        self.command.root_path()
    }

    fn subcommands(&self) -> &SubcommandTable {
        self.command.subcommands()
    }

    fn run_with(&self, args: &[&str], options: &InvokeOptions) -> Result<Output, CommandError> {
        self.command.run_with(args, options)
    }
}

/// Proxy for `moz-phab`.
#[derive(Debug)]
pub struct MozPhab {
    command: Command,
}

impl MozPhab {
    /// Create a proxy for `<path>/moz-phab`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MozPhab {
            command: Command::new("moz-phab", path),
        }
    }

    /// Use another process invoker.
    pub fn with_invoker(mut self, invoker: Arc<dyn ProcessInvoker>) -> Self {
        self.command = self.command.with_invoker(invoker);
        self
    }

    /// Report failures to another sink.
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.command = self.command.with_sink(sink);
        self
    }

    /// Review URL in moz-phab output, see [`find_url`].
    pub fn find_url<'t>(&self, text: &'t str) -> Option<&'t str> {
        find_url(text)
    }
}

impl Tool for MozPhab {
    fn name(&self) -> &str {
        self.command.name()
    }

    fn root_path(&self) -> &Path {
        self.command.root_path()
    }

    fn subcommands(&self) -> &SubcommandTable {
        self.command.subcommands()
    }

    fn run_with(&self, args: &[&str], options: &InvokeOptions) -> Result<Output, CommandError> {
        self.command.run_with(args, options)
    }
}
