//! Generic proxy for a named external command rooted at a directory.
//!
//! A [`Command`] runs `<root_path>/<name> <subcommand> args…` from
//! `root_path`. Subcommands are not declared anywhere: [`ToolExt::op`] turns
//! any name into a callable, so `mach.op("try_push")` runs `mach try-push`.
//! It works on `dyn Tool` as well.
//!
//! ```no_run
//! use lib::{Command, Tool, ToolExt};
//! let git_cinnabar = Command::new("git-cinnabar", "/usr/local/bin");
//! let rev = git_cinnabar.op("hg2git").call(&["a1b2c3d4e5f6"])?;
//! let same = git_cinnabar.run(&["hg2git", "a1b2c3d4e5f6"])?;
//! # Ok::<(), lib::CommandError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

use crate::error::CommandError;
use crate::invoker::{ProcessInvoker, SystemInvoker};
use crate::output::{InvokeOptions, Output};
use crate::telemetry::{FailureRecord, TelemetrySink, TracingSink};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Turn an operation name into the subcommand token passed to the tool.
///
/// One trailing underscore is dropped (so names clashing with keywords can be
/// written `type_`), then the remaining underscores become hyphens.
/// ```
/// use lib::command::subcommand_token;
/// assert_eq!(subcommand_token("try_push"), "try-push");
/// assert_eq!(subcommand_token("list_"), "list");
/// assert_eq!(subcommand_token("wpt_manifest_"), "wpt-manifest");
/// ```
pub fn subcommand_token(name: &str) -> String {
    name.strip_suffix('_').unwrap_or(name).replace('_', "-")
}

/// A subcommand operation bound to its token.
#[derive(Debug, PartialEq, Eq)]
pub struct Subcommand {
    name: String,
    token: String,
}

impl Subcommand {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            token: subcommand_token(name),
        }
    }

    /// Name the operation was requested with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token passed as first argument to the tool.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Run this subcommand on `tool`: same as `tool.run_with([token] + args, options)`.
    pub fn call<T: Tool + ?Sized>(
        &self,
        tool: &T,
        args: &[&str],
        options: &InvokeOptions,
    ) -> Result<Output, CommandError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(self.token.as_str());
        full.extend_from_slice(args);
        tool.run_with(&full, options)
    }
}

/// Lazily filled table of the subcommands requested from one tool instance.
#[derive(Debug, Default)]
pub struct SubcommandTable {
    entries: Mutex<HashMap<String, Arc<Subcommand>>>,
}

impl SubcommandTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the subcommand for `name`, synthesizing it on first request.
    pub fn resolve(&self, name: &str) -> Arc<Subcommand> {
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(name) {
            return Arc::clone(existing);
        }
        let subcommand = Arc::new(Subcommand::new(name));
        trace!("Synthesized {:?} -> {:?}", name, subcommand.token);
        entries.insert(name.to_owned(), Arc::clone(&subcommand));
        subcommand
    }

    /// Number of subcommands synthesized so far.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// `true` if no subcommand was requested yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`Subcommand`] together with the tool it runs on.
pub struct BoundSubcommand<'a, T: ?Sized> {
    tool: &'a T,
    subcommand: Arc<Subcommand>,
}

impl<'a, T: Tool + ?Sized> BoundSubcommand<'a, T> {
    /// Run with default options.
    pub fn call(&self, args: &[&str]) -> Result<Output, CommandError> {
        self.subcommand
            .call(self.tool, args, &InvokeOptions::default())
    }

    /// Run with explicit options.
    pub fn call_with(&self, args: &[&str], options: &InvokeOptions) -> Result<Output, CommandError> {
        self.subcommand.call(self.tool, args, options)
    }

    /// The cached subcommand.
    pub fn subcommand(&self) -> &Arc<Subcommand> {
        &self.subcommand
    }
}

/// Common call surface of real proxies and their mocks.
pub trait Tool: Send + Sync {
    /// Executable base name.
    fn name(&self) -> &str;

    /// Directory holding the executable, also used as working directory.
    fn root_path(&self) -> &Path;

    /// Run the tool with `args`, whose first element is the subcommand.
    fn run_with(&self, args: &[&str], options: &InvokeOptions) -> Result<Output, CommandError>;

    /// Per instance cache of synthesized subcommands.
    fn subcommands(&self) -> &SubcommandTable;

    /// Run the tool with default options.
    fn run(&self, args: &[&str]) -> Result<Output, CommandError> {
        self.run_with(args, &InvokeOptions::default())
    }

    /// Cached subcommand for the operation `name`.
    fn subcommand(&self, name: &str) -> Arc<Subcommand> {
        self.subcommands().resolve(name)
    }
}

/// Operation lookup available on every [`Tool`], trait objects included.
pub trait ToolExt: Tool {
    /// Subcommand for the operation `name`, bound to this tool.
    fn op(&self, name: &str) -> BoundSubcommand<'_, Self>;
}

impl<T: Tool + ?Sized> ToolExt for T {
    fn op(&self, name: &str) -> BoundSubcommand<'_, Self> {
        BoundSubcommand {
            tool: self,
            subcommand: self.subcommand(name),
        }
    }
}

/// Proxy running a real executable through a [`ProcessInvoker`].
pub struct Command {
    name: String,
    root_path: PathBuf,
    invoker: Arc<dyn ProcessInvoker>,
    sink: Arc<dyn TelemetrySink>,
    subcommands: SubcommandTable,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("root_path", &self.root_path)
            .finish()
    }
}

impl Command {
    /// Create a proxy for `root_path/name`, run through [`SystemInvoker`]
    /// and reporting failures to [`TracingSink`].
    pub fn new(name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Command {
            name: name.into(),
            root_path: root_path.into(),
            invoker: Arc::new(SystemInvoker),
            sink: Arc::new(TracingSink),
            subcommands: SubcommandTable::new(),
        }
    }

    /// Use another process invoker.
    pub fn with_invoker(mut self, invoker: Arc<dyn ProcessInvoker>) -> Self {
        self.invoker = invoker;
        self
    }

    /// Report failures to another sink.
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Full path of the executable.
    pub fn program(&self) -> PathBuf {
        self.root_path.join(&self.name)
    }
}

impl Tool for Command {
    fn name(&self) -> &str {
        &self.name
    }

    fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn subcommands(&self) -> &SubcommandTable {
        &self.subcommands
    }

    fn run_with(&self, args: &[&str], options: &InvokeOptions) -> Result<Output, CommandError> {
        if args.is_empty() {
            return Err(CommandError::MissingSubcommand {
                command: self.name.clone(),
            });
        }
        let argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.invoker
            .execute(&self.program(), &argv, &self.root_path, options)
            .inspect_err(|e| {
                if let Some(record) = FailureRecord::from_error(e) {
                    self.sink.record_failure(&record);
                }
            })
    }
}
