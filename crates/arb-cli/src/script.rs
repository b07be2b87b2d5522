//! Deterministic offline run of a JSON-lines command script.
//!
//! Frames advance only through `advanceFrames`; a `snapshot` advances one
//! frame to produce its image. Blank lines and `#` comments are skipped.

use std::io::Write;
use std::path::Path;
use std::sync::mpsc;

use anyhow::{Context, Result};
use arb_core::{ArError, Response, encode_image};

use crate::bridge::parse_request;
use crate::host::{Handled, Host, encode_line};

/// Run every request in `script`, writing events and responses to `out`.
/// Stops early after `dispose`. Returns the number of requests run.
pub fn run(host: &mut Host, script: &str, out: &mut impl Write) -> Result<usize> {
    let mut count = 0;
    for (lineno, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        count += 1;
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(rejected) => {
                tracing::warn!(line = lineno + 1, "skipping malformed script line");
                write_line(out, &rejected)?;
                continue;
            }
        };
        match host.handle(request) {
            Handled::Reply { events, response } => {
                write_all(out, &events)?;
                write_line(out, &response)?;
            }
            Handled::Snapshot { id } => {
                let response = snapshot(host, id, out)?;
                write_line(out, &response)?;
            }
        }
        if host.is_disposed() {
            break;
        }
    }
    write_all(out, &host.shutdown())?;
    out.flush().context("failed to flush output")?;
    Ok(count)
}

pub fn run_file(host: &mut Host, path: &Path, out: &mut impl Write) -> Result<usize> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    run(host, &script, out)
}

fn snapshot(host: &mut Host, id: u64, out: &mut impl Write) -> Result<Response> {
    let (tx, rx) = mpsc::channel();
    host.request_snapshot(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    write_all(out, &host.tick())?;
    Ok(match rx.try_recv() {
        Ok(result) => Response::from_result(id, result.map(|bytes| encode_image(&bytes))),
        Err(_) => Response::err(
            id,
            &ArError::ProviderUnavailable("no frame to snapshot".to_string()),
        ),
    })
}

fn write_line<T: serde::Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    if let Some(line) = encode_line(value) {
        writeln!(out, "{line}").context("failed to write output")?;
    }
    Ok(())
}

fn write_all<T: serde::Serialize>(out: &mut impl Write, values: &[T]) -> Result<()> {
    for value in values {
        write_line(out, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_store::{BridgeConfig, Store};
    use serde_json::Value;

    fn run_script(script: &str) -> (Vec<Value>, Host) {
        let config = BridgeConfig::parse("[simulation]\ncloud_latency_frames = 2\n").unwrap();
        let mut host = Host::with_store(Store::open_in_memory().unwrap(), &config).unwrap();
        let mut out = Vec::new();
        run(&mut host, script, &mut out).unwrap();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (lines, host)
    }

    #[test]
    fn test_host_script_reports_upload() {
        let script = r#"
# upload one anchor
{"id": 1, "method": "initCloudAnchorMode"}
{"id": 2, "method": "createAnchor", "args": {"name": "A", "transformation": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,-1,1]}}
{"id": 3, "method": "hostAnchor", "args": {"name": "A"}}
{"id": 4, "method": "advanceFrames", "args": {"count": 3}}
"#;
        let (lines, host) = run_script(script);
        let uploaded: Vec<_> = lines
            .iter()
            .filter(|l| l["method"] == "onCloudAnchorUploaded")
            .collect();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0]["channel"], "aranchors");
        assert_eq!(uploaded[0]["args"]["name"], "A");

        let last = lines.iter().rfind(|l| l["id"] == 4).unwrap();
        assert_eq!(last["result"], 3);
        assert!(host.store().find_by_name("A").unwrap().is_some());
        assert!(host.is_disposed());
    }

    #[test]
    fn test_snapshot_returns_image() {
        let (lines, _) = run_script(r#"{"id": 1, "method": "snapshot"}"#);
        let response = lines.iter().find(|l| l["id"] == 1).unwrap();
        let image = response["result"].as_str().unwrap();
        assert!(image.starts_with("iVBORw0KGg"));
    }

    #[test]
    fn test_stops_after_dispose() {
        let script = r#"
{"id": 1, "method": "dispose"}
{"id": 2, "method": "getCameraPose"}
"#;
        let (lines, _) = run_script(script);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["id"], 1);
    }

    #[test]
    fn test_malformed_line_does_not_stop_script() {
        let script = "{nope\n{\"id\": 2, \"method\": \"getAnchorPose\", \"args\": {\"name\": \"X\"}}\n";
        let (lines, _) = run_script(script);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["error"]["kind"], "NotFound");
    }
}
