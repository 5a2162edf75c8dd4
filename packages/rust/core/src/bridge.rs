//! Subprocess collaborator bridge.
//!
//! Spawns the collaborator script (search, model, artifact generators) and
//! talks to it over a JSON-lines protocol on stdin/stdout. One request is in
//! flight at a time; the child's stderr is inherited so its logs reach the
//! terminal.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use reportforge_shared::{BridgeConfig, ReportforgeError, Result};

use crate::collaborators::{
    ArtifactGenerator, InferenceProvider, SearchHit, SearchOptions, SearchProvider,
    SearchResponse,
};

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Search,
    SearchBasic,
    Generate,
    MentalDrivers,
    VisualProofs,
    AntiObjection,
    PrePitch,
    FuturePredictions,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::SearchBasic => "search_basic",
            Self::Generate => "generate",
            Self::MentalDrivers => "mental_drivers",
            Self::VisualProofs => "visual_proofs",
            Self::AntiObjection => "anti_objection",
            Self::PrePitch => "pre_pitch",
            Self::FuturePredictions => "future_predictions",
        }
    }
}

/// Request message sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum RequestMessage {
    #[serde(rename = "invoke")]
    Invoke {
        id: String,
        task: TaskType,
        payload: Value,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result { id: String, result: Value },
    #[serde(rename = "error")]
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

fn bridge_error(msg: impl Into<String>) -> ReportforgeError {
    ReportforgeError::Bridge(msg.into())
}

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

/// Handle to the spawned collaborator subprocess.
struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
}

impl BridgeHandle {
    fn spawn(config: &BridgeConfig) -> Result<Self> {
        info!(cmd = %config.command, script = %config.script, "spawning collaborator bridge");

        let mut child = Command::new(&config.command)
            .arg("run")
            .arg(&config.script)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                bridge_error(format!(
                    "failed to spawn bridge: {e}. Is `{}` installed?",
                    config.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| bridge_error("failed to capture bridge stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| bridge_error("failed to capture bridge stdout"))?;

        let mut handle = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
        };
        handle.wait_for_ready()?;
        Ok(handle)
    }

    fn read_message(&mut self) -> Result<(ResponseMessage, String)> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| bridge_error(format!("bridge read error: {e}")))?;
        if line.is_empty() {
            return Err(bridge_error("bridge closed stdout unexpectedly"));
        }
        let msg = parse_response(&line)?;
        Ok((msg, line))
    }

    fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message()? {
            (ResponseMessage::Ready, _) => {
                info!("bridge is ready");
                Ok(())
            }
            (_, line) => Err(bridge_error(format!("expected ready message, got: {line}"))),
        }
    }

    fn send_task(&mut self, task: TaskType, payload: Value) -> Result<Value> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        let json = serde_json::to_string(&RequestMessage::Invoke {
            id: id.clone(),
            task,
            payload,
        })
        .map_err(|e| bridge_error(format!("failed to serialize request: {e}")))?;

        writeln!(self.stdin, "{json}")
            .map_err(|e| bridge_error(format!("failed to write to bridge stdin: {e}")))?;
        self.stdin
            .flush()
            .map_err(|e| bridge_error(format!("failed to flush bridge stdin: {e}")))?;

        match self.read_message()?.0 {
            ResponseMessage::Result {
                id: resp_id,
                result,
            } => {
                if resp_id != id {
                    return Err(bridge_error(format!(
                        "response id mismatch: sent {id}, got {resp_id}"
                    )));
                }
                Ok(result)
            }
            ResponseMessage::Error { error, .. } => {
                Err(ReportforgeError::collaborator(task.as_str(), error))
            }
            ResponseMessage::Ready => Err(bridge_error("unexpected ready message")),
        }
    }

    fn shutdown(mut self) {
        if let Ok(json) = serde_json::to_string(&RequestMessage::Shutdown) {
            let _ = writeln!(self.stdin, "{json}");
            let _ = self.stdin.flush();
        }
        match self.child.wait() {
            Ok(status) => info!(?status, "bridge exited"),
            Err(e) => warn!("bridge wait error: {e}"),
        }
    }
}

fn parse_response(line: &str) -> Result<ResponseMessage> {
    serde_json::from_str(line.trim()).map_err(|e| {
        bridge_error(format!(
            "invalid bridge response: {e} (got: {})",
            line.chars().take(200).collect::<String>()
        ))
    })
}

// ---------------------------------------------------------------------------
// Collaborator implementations
// ---------------------------------------------------------------------------

/// Shared bridge implementing every collaborator trait the pipeline needs.
pub struct CollaboratorBridge {
    handle: Mutex<Option<BridgeHandle>>,
}

impl CollaboratorBridge {
    pub fn spawn(config: &BridgeConfig) -> Result<Self> {
        Ok(Self {
            handle: Mutex::new(Some(BridgeHandle::spawn(config)?)),
        })
    }

    /// Send one task and wait for its result. Never held across an await.
    fn invoke(&self, task: TaskType, payload: Value) -> Result<Value> {
        debug!(task = task.as_str(), "bridge invoke");
        let mut guard = self
            .handle
            .lock()
            .map_err(|_| bridge_error("bridge lock poisoned"))?;
        let handle = guard
            .as_mut()
            .ok_or_else(|| bridge_error("bridge has been shut down"))?;
        handle.send_task(task, payload)
    }

    fn invoke_as<T: serde::de::DeserializeOwned>(&self, task: TaskType, payload: Value) -> Result<T> {
        let value = self.invoke(task, payload)?;
        serde_json::from_value(value)
            .map_err(|e| bridge_error(format!("unexpected {} result shape: {e}", task.as_str())))
    }

    /// Ask the child to exit and wait for it.
    pub fn shutdown(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}

#[async_trait]
impl SearchProvider for CollaboratorBridge {
    async fn search(
        &self,
        query: &str,
        context: &Map<String, Value>,
        options: SearchOptions,
    ) -> Result<SearchResponse> {
        self.invoke_as(
            TaskType::Search,
            json!({"query": query, "context": context, "options": options}),
        )
    }

    async fn search_basic(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.invoke_as(TaskType::SearchBasic, json!({"query": query, "limit": limit}))
    }
}

#[async_trait]
impl InferenceProvider for CollaboratorBridge {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let result = self.invoke(
            TaskType::Generate,
            json!({"prompt": prompt, "maxTokens": max_tokens}),
        )?;
        generated_text(result)
    }
}

/// Model text from a `generate` result: a bare string or `{ "text": .. }`.
fn generated_text(result: Value) -> Result<String> {
    match result {
        Value::String(text) => Ok(text),
        Value::Object(mut map) => match map.remove("text") {
            Some(Value::String(text)) => Ok(text),
            _ => Err(bridge_error("generate result has no text")),
        },
        _ => Err(bridge_error("generate result has no text")),
    }
}

#[async_trait]
impl ArtifactGenerator for CollaboratorBridge {
    async fn mental_drivers(&self, avatar: &Value, context: &Map<String, Value>) -> Result<Value> {
        self.invoke(
            TaskType::MentalDrivers,
            json!({"avatar": avatar, "context": context}),
        )
    }

    async fn visual_proofs(
        &self,
        concepts: &[String],
        avatar: &Value,
        context: &Map<String, Value>,
    ) -> Result<Value> {
        self.invoke(
            TaskType::VisualProofs,
            json!({"concepts": concepts, "avatar": avatar, "context": context}),
        )
    }

    async fn anti_objection(
        &self,
        objections: &[String],
        avatar: &Value,
        context: &Map<String, Value>,
    ) -> Result<Value> {
        self.invoke(
            TaskType::AntiObjection,
            json!({"objections": objections, "avatar": avatar, "context": context}),
        )
    }

    async fn pre_pitch(
        &self,
        drivers: &Value,
        avatar: &Value,
        context: &Map<String, Value>,
    ) -> Result<Value> {
        self.invoke(
            TaskType::PrePitch,
            json!({"drivers": drivers, "avatar": avatar, "context": context}),
        )
    }

    async fn future_predictions(
        &self,
        segment: &str,
        context: &Map<String, Value>,
        horizon_months: u32,
    ) -> Result<Value> {
        self.invoke(
            TaskType::FuturePredictions,
            json!({"segment": segment, "context": context, "horizonMonths": horizon_months}),
        )
    }
}
