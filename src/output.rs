//! Captured process output and the options accepted by an invocation.
use std::borrow::Cow;
use std::fmt;

/// Raw bytes captured from a tool invocation.
///
/// Output is kept verbatim: no trimming and no decoding. Use
/// [`Output::to_string_lossy`] when text is needed.
/// ```
/// use lib::Output;
/// let out = Output::from("https://example.com\n");
/// assert_eq!(out.to_string_lossy(), "https://example.com\n");
/// assert_eq!(out, "https://example.com\n");
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Output(Vec<u8>);

impl Output {
    /// Wrap raw captured bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Captured bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the captured bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Output decoded as UTF-8, invalid sequences replaced.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// `true` when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<Vec<u8>> for Output {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<String> for Output {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for Output {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl PartialEq<&str> for Output {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<str> for Output {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

/// Where the standard error of the tool goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    /// Left attached to the caller's stderr; only stdout is captured.
    #[default]
    Inherit,
    /// Captured with stdout through the same pipe, in write order.
    Merge,
    /// Thrown away.
    Discard,
}

/// Options forwarded to the process invoker.
///
/// This is the closed set of supported options: extra environment
/// variables and stderr redirection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvokeOptions {
    /// Extra environment variables, added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Stderr handling.
    pub stderr: StderrMode,
}

impl InvokeOptions {
    /// Options capturing stderr together with stdout.
    pub fn merged() -> Self {
        Self {
            stderr: StderrMode::Merge,
            ..Default::default()
        }
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}
