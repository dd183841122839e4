pub mod registry;

pub use registry::{CommandRegistry, CommandTable, Resolution};

use async_trait::async_trait;
use std::sync::Arc;

/// One dispatched command line after tokenizing and name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The command word exactly as the user typed it.
    pub typed: String,
    /// The registered name it resolved to (differs from `typed` on prefix matches).
    pub name: String,
    /// Remaining whitespace-separated tokens.
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(typed: impl Into<String>, name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            typed: typed.into(),
            name: name.into(),
            args,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Arguments re-joined with single spaces.
    pub fn joined_args(&self) -> String {
        self.args.join(" ")
    }

    /// Numeric argument at `index`, or `default` when absent.
    pub fn count(&self, index: usize, default: usize) -> anyhow::Result<usize> {
        match self.arg(index) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid count '{raw}', expected a number")),
        }
    }
}

/// A command callable from the prompt: builtins, plugin commands and
/// declarative manifest commands all implement this.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// One-line summary shown by `help`.
    fn description(&self) -> &str {
        ""
    }

    /// Run the command. `Ok(Some(text))` is printed by the shell.
    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>>;
}

/// Closure-backed [`CommandHandler`].
pub struct FnCommand<F> {
    description: String,
    f: F,
}

#[async_trait]
impl<F> CommandHandler for FnCommand<F>
where
    F: Fn(&Invocation) -> anyhow::Result<Option<String>> + Send + Sync,
{
    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>> {
        (self.f)(invocation)
    }
}

/// Wrap a synchronous closure as a shareable command handler.
pub fn command_fn<F>(description: impl Into<String>, f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(&Invocation) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
{
    Arc::new(FnCommand {
        description: description.into(),
        f,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closure_command_sees_arguments() {
        let echo = command_fn("echo back", |inv| Ok(Some(inv.joined_args())));
        let inv = Invocation::new("ec", "echo", vec!["a".into(), "b".into()]);

        assert_eq!(echo.description(), "echo back");
        assert_eq!(echo.call(&inv).await.unwrap().as_deref(), Some("a b"));
    }

    #[test]
    fn count_argument_defaults_and_rejects_garbage() {
        let inv = |args: &[&str]| {
            Invocation::new("x", "x", args.iter().map(|s| (*s).to_string()).collect())
        };
        assert_eq!(inv(&[]).count(0, 10).unwrap(), 10);
        assert_eq!(inv(&["3"]).count(0, 10).unwrap(), 3);
        assert!(inv(&["-1"]).count(0, 10).is_err());
        assert!(inv(&["lots"]).count(0, 10).unwrap_err().to_string().contains("lots"));
        assert_eq!(inv(&["a", "b"]).arg(1), Some("b"));
        assert_eq!(inv(&["a", "b"]).arg(2), None);
    }
}
