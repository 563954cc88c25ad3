//! Command line parameters, configuration file and their merge.
use ::structopt::clap::AppSettings;
use anyhow::{bail, Context, Result};
use directories_next::ProjectDirs;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use structopt;
use tracing::debug;

use crate::cache::{CleanupPolicy, WptCache};
use crate::output::{InvokeOptions, StderrMode};

/// Parse a `KEY=VALUE` environment assignment.
/// ```
/// use lib::config::parse_env;
/// assert_eq!(parse_env("MOZ_HEADLESS=1").unwrap(), ("MOZ_HEADLESS".to_owned(), "1".to_owned()));
/// assert_eq!(parse_env("EMPTY=").unwrap(), ("EMPTY".to_owned(), "".to_owned()));
/// assert!(parse_env("NOVALUE").is_err());
/// ```
pub fn parse_env(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => bail!("Expect KEY=VALUE (in '{}')", s),
    }
}

// Courtesy of structopt_flags crate
/// Verbosity flags shared by all commands.
#[derive(structopt::StructOpt, Debug, Clone, PartialEq, Eq)]
pub struct QuietVerbose {
    /// Increase the output's verbosity level
    ///
    /// Pass many times to increase verbosity level, up to 3.
    #[structopt(
        name = "quietverbose",
        long = "verbose",
        short = "v",
        parse(from_occurrences),
        conflicts_with = "quietquiet",
        global = true
    )]
    verbosity_level: u8,

    /// Decrease the output's verbosity level.
    ///
    /// Used once, it will set error log level.
    /// Used twice, will silent the log completely
    #[structopt(
        name = "quietquiet",
        long = "quiet",
        short = "q",
        parse(from_occurrences),
        conflicts_with = "quietverbose",
        global = true
    )]
    quiet_level: u8,
}

impl Default for QuietVerbose {
    fn default() -> Self {
        QuietVerbose {
            verbosity_level: 0,
            quiet_level: 0,
        }
    }
}

impl Serialize for QuietVerbose {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.get_level_filter())
    }
}

fn de_from_str<'de, D>(deserializer: D) -> Result<QuietVerbose, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let (verbosity_level, quiet_level) = match s.to_ascii_lowercase().as_ref() {
        "off" => (0, 2),
        "error" => (0, 1),
        "warn" => (0, 0),
        "info" => (1, 0),
        "debug" => (2, 0),
        _ => (3, 0),
    };
    Ok(QuietVerbose {
        verbosity_level,
        quiet_level,
    })
}

impl QuietVerbose {
    fn is_default(&self) -> bool {
        *self == QuietVerbose::default()
    }

    /// Level filter understood by `tracing_subscriber::EnvFilter`.
    pub fn get_level_filter(&self) -> &'static str {
        let quiet: i8 = if self.quiet_level > 1 {
            2
        } else {
            self.quiet_level as i8
        };
        let verbose: i8 = if self.verbosity_level > 2 {
            3
        } else {
            self.verbosity_level as i8
        };
        match verbose - quiet {
            -2 => "Off",
            -1 => "Error",
            0 => "Warn",
            1 => "Info",
            2 => "Debug",
            _ => "Trace",
        }
    }
}

fn is_false(b: &bool) -> bool {
    !b
}

/// Settings that may come from the configuration file as well as from the
/// command line.
#[derive(structopt::StructOpt, Serialize, Deserialize, Debug, Clone, Default)]
pub struct Settings {
    /// directory holding the tool executable, also used as working directory
    ///
    /// Defaults to the current directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(short, long, env = "CMDPROXY_ROOT", parse(from_os_str))]
    pub root: Option<PathBuf>,

    /// capture the tool's stderr together with its stdout
    #[serde(default, skip_serializing_if = "is_false")]
    #[structopt(long)]
    pub merge_stderr: bool,

    /// extra environment variable given to the tool (KEY=VALUE)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[structopt(short, long = "env", number_of_values = 1, parse(try_from_str = parse_env))]
    pub env: Vec<(String, String)>,

    /// what to do when the wpt cache cannot be removed after mach ran
    /// (ignore, warn or fail)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long, env = "CMDPROXY_CLEANUP_FAILURE")]
    pub cleanup_failure: Option<CleanupPolicy>,

    /// wpt cache directory removed after mach ran
    ///
    /// Will use ~/.mozbuild/cache/wpt if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long, env = "CMDPROXY_WPT_CACHE", parse(from_os_str))]
    pub wpt_cache: Option<PathBuf>,

    /// file receiving one JSON record per failed command
    ///
    /// Failures are only logged if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long, env = "CMDPROXY_TELEMETRY_FILE", parse(from_os_str))]
    pub telemetry_file: Option<PathBuf>,

    /// Log verbosity
    #[structopt(flatten)]
    #[serde(
        default,
        deserialize_with = "de_from_str",
        skip_serializing_if = "QuietVerbose::is_default"
    )]
    pub verbose: QuietVerbose,
}

#[derive(structopt::StructOpt, Debug)]
/// Run mach, wpt, moz-phab or any other tool through a uniform proxy
///
/// The subcommand may be written with underscores (`try_push`, `list_`), it is
/// translated to the tool's hyphenated form.
#[structopt(global_settings(&[AppSettings::ColoredHelp, AppSettings::ColorAuto, AppSettings::TrailingVarArg]))]
pub struct Args {
    /// configuration file
    ///
    /// Will use cmdproxy.toml in the user configuration directory if unset.
    #[structopt(short, long, env = "CMDPROXY_CONFIG", parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// only print the last Phabricator review URL of the output (moz-phab only)
    #[structopt(long)]
    pub find_url: bool,

    /// Settings that may also come from the configuration file
    #[structopt(flatten)]
    pub settings: Settings,

    /// tool to run (mach, wpt, moz-phab or any executable name)
    pub tool: String,

    /// subcommand and its arguments
    #[structopt(required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Default location of the configuration file.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("org", "mozilla", "cmdproxy").map(|dirs| dirs.config_dir().join("cmdproxy.toml"))
}

impl Args {
    /// Merge settings: defaults → configuration file → command line.
    pub fn merged_settings(&self) -> Result<Settings> {
        let file = self.config.clone().or_else(default_config_file);
        let settings = merge_settings(file.as_deref(), &self.settings)?;
        debug!("Merge config and parameters : {:#?}", settings);
        Ok(settings)
    }

    /// Check argument consistency and build the [`AppConfig`].
    pub fn validate(&self) -> Result<AppConfig> {
        if self.find_url && self.tool != "moz-phab" {
            bail!("--find-url is only supported by moz-phab (not '{}')", self.tool);
        }
        self.merged_settings()?.validate()
    }
}

/// Layer `cli` over the content of the TOML `file`, itself over defaults.
pub fn merge_settings(file: Option<&Path>, cli: &Settings) -> Result<Settings> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    }
    figment
        .merge(Serialized::defaults(cli))
        .extract()
        .context("Reading configuration")
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Tool directory and working directory
    pub root: PathBuf,
    /// Options given to every invocation
    pub options: InvokeOptions,
    /// Cache removal failure handling
    pub cleanup_failure: CleanupPolicy,
    /// Cache removed after mach ran, `None` if no home directory is known
    pub wpt_cache: Option<PathBuf>,
    /// JSON failure record file
    pub telemetry_file: Option<PathBuf>,
    /// Log level filter
    pub log_filter: String,
}

impl Settings {
    /// Fill defaults in and check the values.
    pub fn validate(self) -> Result<AppConfig> {
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir().context("Getting current directory")?,
        };
        if !root.is_dir() {
            bail!("Root path {:?} is not a directory", root);
        }
        let wpt_cache = self
            .wpt_cache
            .or_else(|| WptCache::user_default().map(|c| c.path().to_owned()));
        Ok(AppConfig {
            root,
            options: InvokeOptions {
                env: self.env,
                stderr: if self.merge_stderr {
                    StderrMode::Merge
                } else {
                    StderrMode::Inherit
                },
            },
            cleanup_failure: self.cleanup_failure.unwrap_or_default(),
            wpt_cache,
            telemetry_file: self.telemetry_file,
            log_filter: self.verbose.get_level_filter().to_owned(),
        })
    }
}

#[cfg(test)]
mod should {
    use super::*;
    use mktemp::Temp;
    use std::fs;
    use structopt::StructOpt;
    use test_log::test; // Automatically trace tests

    fn args(cli: &[&str]) -> Args {
        Args::from_iter_safe(std::iter::once("cmdproxy").chain(cli.iter().copied())).unwrap()
    }

    #[test]
    fn parse_tool_and_trailing_arguments() {
        let a = args(&["-e", "A=1", "mach", "try_push", "--artifact", "-b", "do"]);
        assert_eq!(a.tool, "mach");
        assert_eq!(a.command, vec!["try_push", "--artifact", "-b", "do"]);
        assert_eq!(a.settings.env, vec![("A".to_owned(), "1".to_owned())]);
        assert!(!a.find_url);
    }

    #[test]
    fn require_a_subcommand() {
        assert!(Args::from_iter_safe(["cmdproxy", "mach"]).is_err());
    }

    #[test]
    fn reject_find_url_for_other_tools() {
        let temp = Temp::new_dir().unwrap();
        let root = temp.as_path().to_str().unwrap();
        let a = args(&["--find-url", "--root", root, "mach", "build"]);
        assert!(a.validate().is_err());
    }

    #[test]
    fn map_verbosity_to_filter() {
        assert_eq!(args(&["mach", "build"]).settings.verbose.get_level_filter(), "Warn");
        assert_eq!(args(&["-vv", "mach", "build"]).settings.verbose.get_level_filter(), "Debug");
        assert_eq!(args(&["-qq", "mach", "build"]).settings.verbose.get_level_filter(), "Off");
    }

    #[test]
    fn layer_command_line_over_file() -> Result<()> {
        let temp = Temp::new_dir()?;
        let file = temp.as_path().join("cmdproxy.toml");
        fs::write(
            &file,
            r#"
cleanup_failure = "fail"
merge_stderr = true
wpt_cache = "/from/file"
telemetry_file = "/var/log/failures.jsonl"
verbose = "debug"
"#,
        )?;
        let cli = args(&["--wpt-cache", "/from/cli", "wpt", "lint"]);
        let merged = merge_settings(Some(&file), &cli.settings)?;
        assert_eq!(merged.cleanup_failure, Some(CleanupPolicy::Fail));
        assert!(merged.merge_stderr);
        assert_eq!(merged.wpt_cache, Some(PathBuf::from("/from/cli")));
        assert_eq!(
            merged.telemetry_file,
            Some(PathBuf::from("/var/log/failures.jsonl"))
        );
        assert_eq!(merged.verbose.get_level_filter(), "Debug");

        let louder = args(&["-vvv", "wpt", "lint"]);
        let merged = merge_settings(Some(&file), &louder.settings)?;
        assert_eq!(merged.verbose.get_level_filter(), "Trace");
        Ok(())
    }

    #[test]
    fn validate_into_app_config() -> Result<()> {
        let temp = Temp::new_dir()?;
        let settings = Settings {
            root: Some(temp.as_path().to_owned()),
            merge_stderr: true,
            env: vec![("MOZ_HEADLESS".into(), "1".into())],
            wpt_cache: Some(PathBuf::from("/tmp/wpt-cache")),
            ..Default::default()
        };
        let config = settings.validate()?;
        assert_eq!(config.root, temp.as_path());
        assert_eq!(config.options, InvokeOptions::merged().with_env("MOZ_HEADLESS", "1"));
        assert_eq!(config.cleanup_failure, CleanupPolicy::Warn);
        assert_eq!(config.wpt_cache, Some(PathBuf::from("/tmp/wpt-cache")));
        assert_eq!(config.log_filter, "Warn");
        Ok(())
    }

    #[test]
    fn error_when_root_is_not_a_directory() {
        let settings = Settings {
            root: Some(PathBuf::from("/definitely/not/here")),
            ..Default::default()
        };
        match settings.validate() {
            Ok(_) => panic!("Expected an error"),
            Err(e) => assert!(e.to_string().contains("not a directory"), "Unexpected error: {}", e),
        }
    }
}
