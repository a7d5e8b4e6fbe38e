//! Worker process client — NDJSON requests over a child's stdio.
//!
//! One long-lived process hosts the OCR model and/or the entity tagger so
//! model load cost is paid once per run. Framing:
//!   request  → `{"id": 1, "method": "recognize", "params": {...}}`
//!   response ← `{"id": 1, "result": ...}` or `{"id": 1, "error": {...}}`
//! Lines that are not JSON (model loading chatter) are skipped.

use super::{encode_png, Annotations, CollaboratorError, EntityTagger, TextRecognizer, TextSpan};
use base64::Engine;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

/// Grace period between closing stdin and killing the worker.
const SHUTDOWN_GRACE_SECS: u64 = 3;

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    id: Option<u64>,
    result: Option<serde_json::Value>,
    error: Option<WorkerFault>,
}

#[derive(Debug, Deserialize)]
struct WorkerFault {
    #[serde(default)]
    code: i64,
    message: String,
}

impl std::fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker error {}: {}", self.code, self.message)
    }
}

struct Channel {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

/// A running worker. Requests are serialized; the process answers one at
/// a time.
pub struct WorkerProcess {
    name: String,
    timeout: Duration,
    channel: Mutex<Channel>,
}

impl WorkerProcess {
    /// Resolve `command` on PATH and start it with piped stdio.
    pub fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let program = resolve_command(command)?;

        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| CollaboratorError::Spawn {
            command: program.display().to_string(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| CollaboratorError::Spawn {
            command: command.to_string(),
            reason: "no stdin pipe".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| CollaboratorError::Spawn {
            command: command.to_string(),
            reason: "no stdout pipe".to_string(),
        })?;

        log::info!("[OCR] Worker '{}' started: {}", name, program.display());

        Ok(Self {
            name: name.to_string(),
            timeout,
            channel: Mutex::new(Channel {
                child,
                stdin: BufWriter::new(stdin),
                stdout: BufReader::new(stdout),
                next_id: 1,
            }),
        })
    }

    /// Close stdin, give the worker a moment to exit, then kill it.
    pub async fn shutdown(&self) {
        let mut channel = self.channel.lock().await;
        let _ = channel.stdin.shutdown().await;

        match tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_GRACE_SECS),
            channel.child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => log::info!("[OCR] Worker '{}' exited: {}", self.name, status),
            _ => {
                log::warn!("[OCR] Worker '{}' did not exit gracefully, killing", self.name);
                let _ = channel.child.kill().await;
            }
        }
    }

    /// Send one request and wait for the response with the same id.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let mut channel = self.channel.lock().await;
        let id = channel.next_id;
        channel.next_id += 1;

        let mut line = serde_json::to_string(&WorkerRequest { id, method, params })
            .map_err(|e| self.protocol(format!("request serialize failed: {}", e)))?;
        line.push('\n');

        channel
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.io(e))?;
        channel.stdin.flush().await.map_err(|e| self.io(e))?;

        let response = tokio::time::timeout(self.timeout, self.read_response(&mut channel, id))
            .await
            .map_err(|_| CollaboratorError::Timeout {
                engine: self.name.clone(),
                secs: self.timeout.as_secs(),
            })??;

        if let Some(fault) = response.error {
            return Err(self.protocol(format!("{}: {}", method, fault)));
        }
        let missing = format!("{}: response had neither result nor error", method);
        response.result.ok_or_else(|| self.protocol(missing))
    }

    async fn read_response(
        &self,
        channel: &mut Channel,
        expected_id: u64,
    ) -> Result<WorkerResponse, CollaboratorError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = channel
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| self.io(e))?;
            if n == 0 {
                return Err(self.protocol("stdout closed (process exited?)".to_string()));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<WorkerResponse>(trimmed) {
                Ok(resp) if resp.id == Some(expected_id) => return Ok(resp),
                Ok(_) => continue,
                Err(_) => {
                    log::debug!(
                        "[OCR] Worker '{}' ignoring non-JSON line: {}",
                        self.name,
                        trimmed.chars().take(100).collect::<String>()
                    );
                }
            }
        }
    }

    fn io(&self, source: std::io::Error) -> CollaboratorError {
        CollaboratorError::Io {
            engine: self.name.clone(),
            source,
        }
    }

    fn protocol(&self, reason: String) -> CollaboratorError {
        CollaboratorError::Protocol {
            engine: self.name.clone(),
            reason,
        }
    }
}

impl TextRecognizer for WorkerProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        row: &GrayImage,
        paragraph: bool,
    ) -> Result<Vec<TextSpan>, CollaboratorError> {
        let png =
            encode_png(row).map_err(|e| self.protocol(format!("PNG encode failed: {}", e)))?;
        let params = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&png),
            "paragraph": paragraph,
        });
        let result = self.call("recognize", params).await?;
        serde_json::from_value(result)
            .map_err(|e| self.protocol(format!("bad recognize result: {}", e)))
    }
}

impl EntityTagger for WorkerProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn annotate(&self, text: &str) -> Result<Annotations, CollaboratorError> {
        let result = self
            .call("annotate", serde_json::json!({ "text": text }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| self.protocol(format!("bad annotate result: {}", e)))
    }
}

/// Paths are used as given; bare names are looked up on PATH.
fn resolve_command(command: &str) -> Result<PathBuf, CollaboratorError> {
    let path = PathBuf::from(command);
    if path.components().count() > 1 {
        return Ok(path);
    }
    which::which(command).map_err(|e| CollaboratorError::Spawn {
        command: command.to_string(),
        reason: e.to_string(),
    })
}
