use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::error::{SignError, SignResult};

/// Opaque signer for Douyin's `a_bogus` parameter.
#[async_trait(?Send)]
pub trait SignOracle {
    async fn sign(&self, query: &str, user_agent: &str) -> SignResult<String>;
}

/// Runs an external program with the query and user agent as trailing
/// arguments and reads the token from its stdout.
#[derive(Debug, Clone)]
pub struct CommandSignOracle {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSignOracle {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait(?Send)]
impl SignOracle for CommandSignOracle {
    async fn sign(&self, query: &str, user_agent: &str) -> SignResult<String> {
        if query.is_empty() {
            return Err(SignError::Oracle("query string is required".to_string()));
        }
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(query).arg(user_agent).kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| SignError::Oracle(format!("timed out after {:?}", self.timeout)))?
            .map_err(|err| SignError::Oracle(format!("{}: {err}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SignError::Oracle(format!(
                "exited with {:?}: {stderr}",
                output.status.code()
            )));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(SignError::Oracle("empty token".to_string()));
        }
        debug!(program = %self.program.display(), token_len = token.len(), "sign oracle answered");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandSignOracle {
        CommandSignOracle::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn reads_token_from_stdout() {
        let oracle = shell("printf 'ab-%s' \"$0\"");
        let token = oracle.sign("aid=6383", "UA").await.unwrap();
        assert_eq!(token, "ab-aid=6383");
    }

    #[tokio::test]
    async fn failing_program_is_an_oracle_error() {
        let oracle = shell("echo broken >&2; exit 3");
        let err = oracle.sign("aid=6383", "UA").await.unwrap_err();
        assert!(matches!(err, SignError::Oracle(message) if message.contains("broken")));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let oracle = shell("printf token");
        assert!(oracle.sign("", "UA").await.is_err());
    }
}
