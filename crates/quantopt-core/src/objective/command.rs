//! Objectives evaluated by an external program.
//!
//! Protocol: the parameters are written to stdin as one JSON object, the
//! program prints the score as the last non-empty line of stdout and
//! exits with status 0.

use std::process::Stdio;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::Objective;
use crate::models::Parameters;

pub struct CommandObjective {
    program: String,
    args: Vec<String>,
}

impl CommandObjective {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

fn parse_score(stdout: &str) -> anyhow::Result<f64> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("objective printed nothing"))?;
    line.parse::<f64>()
        .with_context(|| format!("objective output '{line}' is not a number"))
}

#[async_trait]
impl Objective for CommandObjective {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        let input = serde_json::to_vec(params)?;
        // kill_on_drop so a timed-out or stopped evaluation does not leave the child behind
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn objective '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            // Programs that ignore stdin may exit before reading it.
            if let Err(e) = stdin.write_all(&input).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e.into());
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "objective '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(program = %self.program, "Objective command finished");
        parse_score(&stdout)
    }
}
