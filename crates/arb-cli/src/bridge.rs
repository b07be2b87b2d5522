//! Stdio JSON-lines bridge.
//!
//! stdin lines become [`Request`]s on a single-consumer queue; the one task
//! that owns the [`Host`] interleaves them with frame ticks. Responses and
//! events are written to stdout by a dedicated writer task.

use std::io::BufRead;
use std::time::Duration;

use anyhow::{Context, Result};
use arb_core::{ArError, Request, Response, encode_image};
use arb_store::BridgeConfig;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::host::{Handled, Host, encode_line};

type Lines = mpsc::UnboundedSender<String>;

/// Serve until `dispose`, stdin EOF, Ctrl-C or SIGTERM.
pub async fn serve(mut host: Host, config: &BridgeConfig) -> Result<()> {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(out_rx));

    let (req_tx, mut req_rx) = mpsc::unbounded_channel();
    spawn_stdin_reader(req_tx);

    let mut ticker = tokio::time::interval(config.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!(
        frame_rate_hz = config.bridge.frame_rate_hz,
        session = host.session_id(),
        "bridge serving on stdio"
    );

    loop {
        tokio::select! {
            incoming = req_rx.recv() => match incoming {
                Some(Ok(request)) => {
                    dispatch(&mut host, request, &out_tx, config.snapshot_timeout());
                    if host.is_disposed() {
                        tracing::info!("disposed by host");
                        break;
                    }
                }
                Some(Err(rejected)) => emit(&out_tx, &rejected),
                None => {
                    tracing::info!("stdin closed");
                    break;
                }
            },
            _ = ticker.tick() => emit_all(&out_tx, host.tick()),
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    emit_all(&out_tx, host.shutdown());
    drop(out_tx);
    // Pending snapshot replies were failed by the dispose above, so their
    // senders are about to drop and the writer drains to the end.
    writer
        .await
        .context("stdout writer panicked")?
        .context("failed to write to stdout")?;
    Ok(())
}

fn dispatch(host: &mut Host, request: Request, out: &Lines, snapshot_timeout: Duration) {
    match host.handle(request) {
        Handled::Reply { events, response } => {
            emit_all(out, events);
            emit(out, &response);
        }
        Handled::Snapshot { id } => {
            let (tx, rx) = oneshot::channel();
            host.request_snapshot(Box::new(move |result| {
                let _ = tx.send(result);
            }));
            let out = out.clone();
            tokio::spawn(async move {
                let response = match tokio::time::timeout(snapshot_timeout, rx).await {
                    Ok(Ok(result)) => {
                        Response::from_result(id, result.map(|bytes| encode_image(&bytes)))
                    }
                    Ok(Err(_)) => Response::err(id, &ArError::Disposed),
                    Err(_) => {
                        tracing::warn!(id, "snapshot timed out");
                        Response::err(
                            id,
                            &ArError::ProviderUnavailable("snapshot timed out".to_string()),
                        )
                    }
                };
                emit(&out, &response);
            });
        }
    }
}

fn emit<T: serde::Serialize>(out: &Lines, value: &T) {
    if let Some(line) = encode_line(value)
        && out.send(line).is_err()
    {
        tracing::warn!("stdout writer gone, line dropped");
    }
}

fn emit_all<T: serde::Serialize>(out: &Lines, values: Vec<T>) {
    for value in &values {
        emit(out, value);
    }
}

/// Blocking stdin reads live on a plain thread so an open stdin never holds
/// up runtime shutdown.
fn spawn_stdin_reader(requests: mpsc::UnboundedSender<std::result::Result<Request, Response>>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if requests.send(parse_request(&line)).is_err() {
                break;
            }
        }
    });
}

/// Parse one stdin line. Malformed lines are answered directly, echoing the
/// id when one can be recovered.
pub fn parse_request(line: &str) -> std::result::Result<Request, Response> {
    serde_json::from_str::<Request>(line).map_err(|e| {
        let id = serde_json::from_str::<serde_json::Value>(line)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_u64()))
            .unwrap_or(0);
        tracing::warn!(error = %e, "malformed request line");
        Response::err(id, &ArError::InvalidCommand(format!("malformed request: {e}")))
    })
}

async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    stdout.flush().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let request = parse_request(r#"{"id": 7, "method": "getCameraPose"}"#).unwrap();
        assert_eq!(request.id, 7);
        assert_eq!(request.method, "getCameraPose");
        assert!(request.args.is_null());
    }

    #[test]
    fn test_malformed_request_keeps_id() {
        let response = parse_request(r#"{"id": 3, "args": {}}"#).unwrap_err();
        assert_eq!(response.id, 3);
        assert_eq!(response.error.unwrap().kind, "InvalidCommand");
    }

    #[test]
    fn test_garbage_line() {
        let response = parse_request("not json").unwrap_err();
        assert_eq!(response.id, 0);
        assert!(response.result.is_none());
    }
}
