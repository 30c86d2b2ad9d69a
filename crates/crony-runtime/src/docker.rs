//! `DockerRuntime`: drives containers through the `docker` CLI.
//!
//! Every operation is a short-lived `docker` child process except the event
//! subscription, which keeps `docker events` running for as long as the
//! returned stream is alive.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use crony_core::{config::RuntimeConfig, NotificationPolicy, Workload, WorkloadId};
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    capture::{RingBuffer, DEFAULT_CAPACITY},
    error::{Result, RuntimeError},
    runtime::Runtime,
    types::{EventStream, LifecycleEvent, LogFrame, LogStream, WorkloadFilter},
};

const READ_CHUNK: usize = 8 * 1024;

/// Label keys read from each container.
#[derive(Debug, Clone)]
pub struct LabelKeys {
    pub schedule: String,
    pub policy: String,
    pub heartbeat: String,
}

impl From<&RuntimeConfig> for LabelKeys {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            schedule: config.schedule_label.clone(),
            policy: config.policy_label.clone(),
            heartbeat: config.heartbeat_label.clone(),
        }
    }
}

pub struct DockerRuntime {
    bin: String,
    labels: LabelKeys,
    default_policy: NotificationPolicy,
    log_capacity: usize,
}

impl DockerRuntime {
    pub fn new(config: &RuntimeConfig, default_policy: NotificationPolicy) -> Self {
        Self {
            bin: config.docker_bin.clone(),
            labels: LabelKeys::from(config),
            default_policy,
            log_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Per-stream bound on the output kept from one `docker logs` call.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run `docker <args>` to completion and return its stdout.
    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(args = ?args, "docker");
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(format!("{}: {e}", self.bin)))?;

        if !output.status.success() {
            return Err(RuntimeError::Command {
                command: format!("{} {}", self.bin, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn start(&self, workload: &Workload) -> Result<()> {
        self.run(&["start".to_string(), workload.id.to_string()])
            .await
            .map(|_| ())
    }

    async fn wait_for_completion(&self, workload: &Workload) -> Result<i64> {
        let out = self
            .run(&["wait".to_string(), workload.id.to_string()])
            .await?;
        parse_exit_code(&out)
    }

    /// Runs `docker logs` to completion before handing anything out, so a
    /// refused request surfaces as an error instead of as workload stderr.
    async fn fetch_output(&self, workload: &Workload, since: DateTime<Utc>) -> Result<LogStream> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut child = self
            .command()
            .args(["logs", "--since", since.as_str(), workload.id.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::Spawn(format!("{}: {e}", self.bin)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Spawn("docker logs: stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::Spawn("docker logs: stderr not captured".into()))?;

        let (out, err, status) = tokio::try_join!(
            read_bounded(stdout, self.log_capacity),
            read_bounded(stderr, self.log_capacity),
            async { child.wait().await.map_err(RuntimeError::Io) },
        )?;

        if !status.success() {
            return Err(RuntimeError::Command {
                command: format!("{} logs {}", self.bin, workload.id),
                status: status.code().unwrap_or(-1),
                stderr: err.to_string_lossy().trim().to_string(),
            });
        }

        let frames: Vec<Result<LogFrame>> = [LogFrame::stdout(out.to_vec()), LogFrame::stderr(err.to_vec())]
            .into_iter()
            .filter(|frame| !frame.data.is_empty())
            .map(Ok)
            .collect();
        Ok(stream::iter(frames).boxed())
    }

    async fn list_schedulable(&self, filter: &WorkloadFilter) -> Result<Vec<Workload>> {
        let mut args: Vec<String> = vec![
            "ps".into(),
            "-a".into(),
            "-q".into(),
            "--no-trunc".into(),
            "--filter".into(),
            format!("label={}", self.labels.schedule),
        ];
        if let WorkloadFilter::Id(id) = filter {
            args.push("--filter".into());
            args.push(format!("id={id}"));
        }

        let ids: Vec<String> = self
            .run(&args)
            .await?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut inspect_args = vec!["inspect".to_string()];
        inspect_args.extend(ids);
        let raw = self.run(&inspect_args).await?;
        let entries: Vec<InspectEntry> =
            serde_json::from_str(&raw).map_err(|e| RuntimeError::Decode(e.to_string()))?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                workload_from_labels(
                    entry.id,
                    &entry.name,
                    &entry.config.labels.unwrap_or_default(),
                    &self.labels,
                    self.default_policy,
                )
            })
            .collect())
    }

    async fn subscribe_events(&self) -> Result<EventStream> {
        let mut child = self
            .command()
            .args([
                "events",
                "--filter",
                "type=container",
                "--filter",
                "event=create",
                "--filter",
                "event=destroy",
                "--format",
                "{{json .}}",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RuntimeError::Spawn(format!("{}: {e}", self.bin)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Spawn("docker events: stdout not captured".into()))?;

        let stream = async_stream::stream! {
            // Owning the child here ties the process lifetime to the stream.
            let mut child = child;
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match parse_event(&line) {
                        Ok(Some(event)) => yield Ok(event),
                        Ok(None) => {}
                        Err(e) => yield Err(e),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(RuntimeError::Io(e));
                        break;
                    }
                }
            }
            match child.wait().await {
                Ok(status) if !status.success() => yield Err(RuntimeError::Command {
                    command: "docker events".to_string(),
                    status: status.code().unwrap_or(-1),
                    stderr: String::new(),
                }),
                Err(e) => yield Err(RuntimeError::Io(e)),
                _ => {}
            }
        };

        Ok(stream.boxed())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Read `reader` to EOF, keeping only the last `capacity` bytes.
async fn read_bounded<R>(mut reader: R, capacity: usize) -> Result<RingBuffer>
where
    R: AsyncRead + Unpin,
{
    let mut kept = RingBuffer::new(capacity);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(kept);
        }
        kept.write(&buf[..n]);
    }
}

fn parse_exit_code(out: &str) -> Result<i64> {
    let trimmed = out.trim();
    trimmed
        .lines()
        .last()
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| RuntimeError::Decode(format!("unexpected docker wait output: {trimmed:?}")))
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Config", default)]
    config: InspectConfig,
}

#[derive(Debug, Default, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

/// Build a workload from container metadata, or `None` when it carries no
/// usable schedule.
fn workload_from_labels(
    id: String,
    name: &str,
    labels: &HashMap<String, String>,
    keys: &LabelKeys,
    default_policy: NotificationPolicy,
) -> Option<Workload> {
    let name = name.trim_start_matches('/').to_string();
    let schedule = labels.get(&keys.schedule)?.trim().trim_matches('"').trim();
    if schedule.is_empty() {
        warn!(container = %name, "empty schedule label, ignoring container");
        return None;
    }

    let policy = match labels.get(&keys.policy).map(|p| p.trim()) {
        None | Some("") => default_policy,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(container = %name, error = %e, "can't parse notification policy label, using default");
            default_policy
        }),
    };

    let heartbeat_id = labels
        .get(&keys.heartbeat)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    Some(Workload {
        id: WorkloadId(id),
        name,
        schedule: schedule.to_string(),
        policy,
        heartbeat_id,
    })
}

#[derive(Debug, Deserialize)]
struct DockerEvent {
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor")]
    actor: DockerActor,
}

#[derive(Debug, Deserialize)]
struct DockerActor {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

fn parse_event(line: &str) -> Result<Option<LifecycleEvent>> {
    let event: DockerEvent =
        serde_json::from_str(line).map_err(|e| RuntimeError::Decode(e.to_string()))?;
    let name = event.actor.attributes.get("name").cloned().unwrap_or_default();
    debug!(action = %event.action, container = %name, "received docker event");

    Ok(match event.action.as_str() {
        "create" => Some(LifecycleEvent::Created {
            id: WorkloadId(event.actor.id),
        }),
        "destroy" => Some(LifecycleEvent::Destroyed {
            id: WorkloadId(event.actor.id),
            name,
        }),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
