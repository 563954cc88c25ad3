//! Scripted stand-ins for tool proxies.
//!
//! [`create_mock`] returns a [`MockTool`] for a tool name. All handles for
//! the same name share one table of scripted responses and one call log for
//! the whole process, so data set through one [`MockCommand`] is seen by every
//! other instance of that tool. Tests own that state: use [`MockTool::reset`]
//! between cases, or an isolated [`MockRegistry`].
//!
//! ```
//! use lib::mock::create_mock;
//! use lib::ToolExt;
//!
//! let git = create_mock("doc-git");
//! git.set_data("rev-parse", "0123abcd\n");
//! let checkout = git.command("/src/gecko");
//! assert_eq!(checkout.op("rev_parse").call(&["HEAD"])?, "0123abcd\n");
//! assert_eq!(git.get_log()[0].args, vec!["rev-parse", "HEAD"]);
//! # Ok::<(), lib::CommandError>(())
//! ```
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use tracing::debug;

use crate::command::{lock, SubcommandTable, Tool};
use crate::error::CommandError;
use crate::output::{InvokeOptions, Output};

type ScriptFn = dyn Fn(&[String], &InvokeOptions) -> Result<Output, CommandError> + Send + Sync;

/// Response registered for a subcommand.
#[derive(Clone)]
pub enum Scripted {
    /// Returned as is.
    Value(Output),
    /// Called with the arguments following the subcommand and the options.
    /// An error is handed to the caller as is and the call is not logged.
    Func(Arc<ScriptFn>),
}

impl fmt::Debug for Scripted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scripted::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Scripted::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<Output> for Scripted {
    fn from(value: Output) -> Self {
        Scripted::Value(value)
    }
}

impl From<&str> for Scripted {
    fn from(value: &str) -> Self {
        Scripted::Value(value.into())
    }
}

impl From<String> for Scripted {
    fn from(value: String) -> Self {
        Scripted::Value(value.into())
    }
}

/// One recorded mock invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Tool name
    pub command: String,
    /// Root path of the instance that was called
    pub cwd: PathBuf,
    /// All arguments, subcommand included
    pub args: Vec<String>,
    /// Options given to the call
    pub options: InvokeOptions,
    /// Value returned to the caller
    pub rv: Output,
}

#[derive(Debug, Default)]
struct MockState {
    data: HashMap<String, Scripted>,
    log: Vec<MockCall>,
}

/// Set of mock tools, keyed by tool name.
#[derive(Debug, Default)]
pub struct MockRegistry {
    tools: Mutex<HashMap<String, Arc<Mutex<MockState>>>>,
}

static GLOBAL: LazyLock<MockRegistry> = LazyLock::new(MockRegistry::new);

impl MockRegistry {
    /// Registry independent from every other one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`create_mock`].
    pub fn global() -> &'static MockRegistry {
        &GLOBAL
    }

    /// Mock for `name`, sharing its state with every other mock of that name
    /// in this registry.
    pub fn tool(&self, name: &str) -> MockTool {
        let state = Arc::clone(lock(&self.tools).entry(name.to_owned()).or_default());
        MockTool {
            name: name.to_owned(),
            state,
        }
    }
}

/// Mock for `name` in the process-wide registry.
pub fn create_mock(name: &str) -> MockTool {
    MockRegistry::global().tool(name)
}

/// Handle on the shared state of one mock tool.
#[derive(Debug, Clone)]
pub struct MockTool {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTool {
    /// Tool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// New instance rooted at `root_path`. Touches neither filesystem nor processes.
    pub fn command(&self, root_path: impl Into<PathBuf>) -> MockCommand {
        MockCommand {
            tool: self.clone(),
            root_path: root_path.into(),
            subcommands: SubcommandTable::new(),
        }
    }

    /// Register the response to `subcommand`.
    pub fn set_data(&self, subcommand: &str, value: impl Into<Scripted>) {
        lock(&self.state)
            .data
            .insert(subcommand.to_owned(), value.into());
    }

    /// Register a callable computing the response to `subcommand`.
    pub fn set_fn<F>(&self, subcommand: &str, f: F)
    where
        F: Fn(&[String], &InvokeOptions) -> Result<Output, CommandError> + Send + Sync + 'static,
    {
        self.set_data(subcommand, Scripted::Func(Arc::new(f)));
    }

    /// Make `subcommand` fail like a tool exiting with `exit_code`.
    pub fn set_failure(&self, subcommand: &str, exit_code: i32, output: impl Into<Output>) {
        let command = self.name.clone();
        let output = output.into();
        self.set_fn(subcommand, move |_, _| {
            Err(CommandError::Failed {
                command: command.clone(),
                exit_code,
                output: output.clone(),
            })
        });
    }

    /// Calls made so far, in call order.
    pub fn get_log(&self) -> Vec<MockCall> {
        lock(&self.state).log.clone()
    }

    /// Forget scripted responses and recorded calls.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.data.clear();
        state.log.clear();
    }
}

/// Mock instance with the same call surface as a real proxy.
#[derive(Debug)]
pub struct MockCommand {
    tool: MockTool,
    root_path: PathBuf,
    subcommands: SubcommandTable,
}

impl MockCommand {
    /// Handle on the shared state of this mock tool.
    pub fn tool(&self) -> &MockTool {
        &self.tool
    }
}

impl Tool for MockCommand {
    fn name(&self) -> &str {
        &self.tool.name
    }

    fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn subcommands(&self) -> &SubcommandTable {
        &self.subcommands
    }

    fn run_with(&self, args: &[&str], options: &InvokeOptions) -> Result<Output, CommandError> {
        let Some(subcommand) = args.first() else {
            return Err(CommandError::MissingSubcommand {
                command: self.tool.name.clone(),
            });
        };
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        // The lock is released while a scripted callable runs.
        let scripted = lock(&self.tool.state).data.get(*subcommand).cloned();
        let rv = match scripted {
            None => Output::default(),
            Some(Scripted::Value(value)) => value,
            Some(Scripted::Func(f)) => f(&args[1..], options)?,
        };
        debug!("Mock {} {:?} -> {:?}", self.tool.name, args, rv);
        lock(&self.tool.state).log.push(MockCall {
            command: self.tool.name.clone(),
            cwd: self.root_path.clone(),
            args,
            options: options.clone(),
            rv: rv.clone(),
        });
        Ok(rv)
    }
}

#[cfg(test)]
mod should {
    use super::*;
    use crate::command::ToolExt;
    use test_log::test; // Automatically trace tests

    #[test]
    fn return_empty_output_for_unscripted_subcommand() {
        let registry = MockRegistry::new();
        let git = registry.tool("git");
        let checkout = git.command("/src/gecko");
        assert_eq!(checkout.run(&["status"]).unwrap(), "");
        assert_eq!(
            git.get_log(),
            vec![MockCall {
                command: "git".into(),
                cwd: PathBuf::from("/src/gecko"),
                args: vec!["status".into()],
                options: InvokeOptions::default(),
                rv: Output::default(),
            }]
        );
    }

    #[test]
    fn compute_response_with_callable() {
        let registry = MockRegistry::new();
        let mach = registry.tool("mach");
        mach.set_fn("export", |args, _| Ok(args[0].to_uppercase().into()));
        let gecko = mach.command("/src/gecko");
        assert_eq!(gecko.run(&["export", "foo"]).unwrap(), "FOO");
        let log = mach.get_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].args, vec!["export", "foo"]);
        assert_eq!(log[0].rv, "FOO");
    }

    #[test]
    fn pass_options_to_callable_and_log() {
        let registry = MockRegistry::new();
        let wpt = registry.tool("wpt");
        wpt.set_fn("run", |_, options| {
            Ok(options
                .env
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
                .into())
        });
        let opts = InvokeOptions::merged().with_env("A", "1");
        let out = wpt.command("/wpt").run_with(&["run"], &opts).unwrap();
        assert_eq!(out, "A=1");
        assert_eq!(wpt.get_log()[0].options, opts);
    }

    #[test]
    fn share_data_and_log_between_instances() {
        let registry = MockRegistry::new();
        let first = registry.tool("moz-phab").command("/a");
        let second = registry.tool("moz-phab").command("/b");
        first.tool().set_data("submit", "https://phabricator.services.mozilla.com/D1");
        assert_eq!(
            second.run(&["submit"]).unwrap(),
            "https://phabricator.services.mozilla.com/D1"
        );
        first.run(&["patch"]).unwrap();
        let log = second.tool().get_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].cwd, PathBuf::from("/b"));
        assert_eq!(log[1].cwd, PathBuf::from("/a"));
        assert_eq!(log[1].args, vec!["patch"]);
    }

    #[test]
    fn keep_tools_apart() {
        let registry = MockRegistry::new();
        registry.tool("mach").set_data("status", "mach status");
        let wpt = registry.tool("wpt").command("/wpt");
        assert_eq!(wpt.run(&["status"]).unwrap(), "");
        assert!(registry.tool("mach").get_log().is_empty());
    }

    #[test]
    fn share_state_process_wide() {
        let tool = create_mock("mock-should-share-state-process-wide");
        tool.reset();
        tool.set_data("status", "clean");
        let other = create_mock("mock-should-share-state-process-wide").command("/x");
        assert_eq!(other.run(&["status"]).unwrap(), "clean");
        assert_eq!(tool.get_log().len(), 1);
        tool.reset();
        assert!(tool.get_log().is_empty());
    }

    #[test]
    fn dispatch_like_real_proxy() {
        let registry = MockRegistry::new();
        let mach = registry.tool("mach");
        mach.set_data("try-push", "pushed");
        let gecko = mach.command("/src/gecko");
        assert_eq!(gecko.op("try_push").call(&["--x"]).unwrap(), "pushed");
        gecko.run(&["try-push", "--x"]).unwrap();
        let log = mach.get_log();
        assert_eq!(log[0].args, log[1].args);
        assert!(Arc::ptr_eq(
            &gecko.subcommand("try_push"),
            &gecko.subcommand("try_push")
        ));
    }

    #[test]
    fn refuse_empty_invocation() {
        let registry = MockRegistry::new();
        let mach = registry.tool("mach");
        assert!(matches!(
            mach.command("/").run(&[]),
            Err(CommandError::MissingSubcommand { .. })
        ));
        assert!(mach.get_log().is_empty());
    }

    #[test]
    fn hand_scripted_failure_to_caller_without_logging() {
        let registry = MockRegistry::new();
        let phab = registry.tool("moz-phab");
        phab.set_failure("submit", 3, "no commits to submit");
        let tool = phab.command("/src/gecko");
        match tool.op("submit").call(&["--yes"]) {
            Err(CommandError::Failed {
                command,
                exit_code,
                output,
            }) => {
                assert_eq!(command, "moz-phab");
                assert_eq!(exit_code, 3);
                assert_eq!(output, "no commits to submit");
            }
            other => panic!("Unexpected result {other:?}"),
        }
        assert!(phab.get_log().is_empty());
    }

    #[test]
    fn let_callables_choose_between_success_and_failure() {
        let registry = MockRegistry::new();
        let wpt = registry.tool("wpt");
        wpt.set_fn("lint", |args, _| match args.first().map(String::as_str) {
            Some("broken") => Err(CommandError::Failed {
                command: "wpt".into(),
                exit_code: 1,
                output: "lint errors".into(),
            }),
            _ => Ok("clean".into()),
        });
        let checkout = wpt.command("/wpt");
        assert_eq!(checkout.run(&["lint", "ok"]).unwrap(), "clean");
        assert_eq!(
            checkout.run(&["lint", "broken"]).unwrap_err().exit_code(),
            Some(1)
        );
        assert_eq!(wpt.get_log().len(), 1);
    }

    #[test]
    fn allow_reentrant_callables() {
        let registry = MockRegistry::new();
        let git = registry.tool("git");
        let inner = git.command("/src");
        git.set_data("rev-parse", "abc");
        git.set_fn("describe", move |_, _| inner.run(&["rev-parse"]));
        assert_eq!(git.command("/src").run(&["describe"]).unwrap(), "abc");
        assert_eq!(git.get_log().len(), 2);
    }
}
