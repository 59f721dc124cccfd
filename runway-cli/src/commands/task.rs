//! `runway task`: drive tasks on a running frontend over HTTP

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use runway_core::InterruptSignal;
use runway_server::ErrorResponse;
use runway_server::http::{
    SignalRequest, SignalResponse, SubmitTaskRequest, SubmitTaskResponse, TaskStatusResponse,
};
use serde::de::DeserializeOwned;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Start the demo work body under a new task
    Submit {
        /// Frontend base URL
        url: String,
        /// Task ID (generated when omitted)
        #[arg(long)]
        task_id: Option<String>,
        /// Number of work steps
        #[arg(long)]
        steps: Option<u32>,
        /// Delay between steps in milliseconds
        #[arg(long)]
        step_ms: Option<u64>,
    },
    /// Send STOP, PAUSE or RESUME to a task
    Signal {
        /// Frontend base URL
        url: String,
        /// Task ID
        task_id: String,
        /// STOP, PAUSE or RESUME
        signal: InterruptSignal,
    },
    /// Show the state of a task
    Status {
        /// Frontend base URL
        url: String,
        /// Task ID
        task_id: String,
    },
}

pub async fn run(args: TaskArgs) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    match args.command {
        TaskCommand::Submit {
            url,
            task_id,
            steps,
            step_ms,
        } => {
            let request = SubmitTaskRequest {
                task_id,
                steps,
                step_ms,
                fail: false,
            };
            let response = client
                .post(task_url(&url, &[])?)
                .json(&request)
                .send()
                .await
                .with_context(|| format!("Failed to reach {}", url))?;
            let submitted: SubmitTaskResponse = decode(response).await?;
            println!("Task {}: {}", submitted.task_id, submitted.state);
        }
        TaskCommand::Signal {
            url,
            task_id,
            signal,
        } => {
            let response = client
                .post(task_url(&url, &[task_id.as_str(), "signal"])?)
                .json(&SignalRequest {
                    signal: signal.as_str().to_string(),
                })
                .send()
                .await
                .with_context(|| format!("Failed to reach {}", url))?;
            let signalled: SignalResponse = decode(response).await?;
            println!(
                "Task {}: {} -> {}",
                signalled.task_id, signalled.signal, signalled.state
            );
        }
        TaskCommand::Status { url, task_id } => {
            let response = client
                .get(task_url(&url, &[task_id.as_str(), "status"])?)
                .send()
                .await
                .with_context(|| format!("Failed to reach {}", url))?;
            let status: TaskStatusResponse = decode(response).await?;
            match status.state {
                Some(state) => println!("Task {}: {}", status.task_id, state),
                None => println!("Task {}: unknown", status.task_id),
            }
        }
    }
    Ok(())
}

/// `<base>/tasks/<segments...>`, with every segment percent-encoded
fn task_url(base: &str, segments: &[&str]) -> Result<reqwest::Url> {
    let mut url =
        reqwest::Url::parse(base).with_context(|| format!("Invalid frontend URL: {}", base))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Invalid frontend URL: {}", base))?
        .pop_if_empty()
        .push("tasks")
        .extend(segments);
    Ok(url)
}

/// Parse a success body, or turn the frontend's error body into an error
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return serde_json::from_str(&body)
            .with_context(|| format!("Unexpected response body: {}", body));
    }
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => bail!("{} ({}, {})", error.error, error.code, status),
        Err(_) => bail!("Request failed with {}: {}", status, body),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        task: TaskArgs,
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn parse_signal_is_case_insensitive() {
        let cli =
            TestCli::try_parse_from(["test", "signal", "http://127.0.0.1:8090", "t1", "pause"])
                .unwrap();
        match cli.task.command {
            TaskCommand::Signal {
                url,
                task_id,
                signal,
            } => {
                assert_eq!(url, "http://127.0.0.1:8090");
                assert_eq!(task_id, "t1");
                assert_eq!(signal, InterruptSignal::Pause);
            }
            other => panic!("expected signal, got {:?}", other),
        }
    }

    #[test]
    fn parse_rejects_unknown_signal() {
        let result =
            TestCli::try_parse_from(["test", "signal", "http://127.0.0.1:8090", "t1", "KILL"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_status() {
        let cli = TestCli::try_parse_from(["test", "status", "http://h", "t9"]).unwrap();
        assert!(matches!(
            cli.task.command,
            TaskCommand::Status { ref task_id, .. } if task_id == "t9"
        ));
    }

    // ==================== URL Tests ====================

    #[test]
    fn task_url_joins_without_double_slash() {
        assert_eq!(
            task_url("http://h:1/", &[]).unwrap().as_str(),
            "http://h:1/tasks"
        );
        assert_eq!(
            task_url("http://h:1", &["t1", "status"]).unwrap().as_str(),
            "http://h:1/tasks/t1/status"
        );
    }

    #[test]
    fn task_url_keeps_base_path() {
        assert_eq!(
            task_url("http://h:1/runway/", &["t1", "signal"]).unwrap().as_str(),
            "http://h:1/runway/tasks/t1/signal"
        );
    }

    #[test]
    fn task_url_encodes_reserved_characters_in_ids() {
        let url = task_url("http://h:1", &["a/b?c#d", "status"]).unwrap();
        assert_eq!(url.as_str(), "http://h:1/tasks/a%2Fb%3Fc%23d/status");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn task_url_rejects_invalid_base() {
        assert!(task_url("not a url", &["t1", "status"]).is_err());
        assert!(task_url("mailto:ops@example.com", &["t1", "status"]).is_err());
    }
}
