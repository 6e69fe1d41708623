use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use super::ClipwrightMcp;

pub const SOCKET_PATH: &str = "/tmp/clipwright.sock";

/// Handle a single JSON-RPC request line, return response (or None for notifications)
pub fn handle_jsonrpc_line(line: &str, mcp: &ClipwrightMcp) -> Option<String> {
    let request: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            let error_response = serde_json::json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {
                    "code": -32700,
                    "message": format!("Parse error: {}", e)
                }
            });
            return Some(error_response.to_string());
        }
    };

    let id = request.get("id").cloned();
    let method = request
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or("");
    let params = request
        .get("params")
        .cloned()
        .unwrap_or(serde_json::json!({}));
    debug!("jsonrpc {}", method);

    let result = match method {
        "initialize" => {
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "clipwright",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })
        }
        "tools/list" => ClipwrightMcp::list_tools(),
        "tools/call" => {
            let tool_name = params
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("");
            let arguments = params
                .get("arguments")
                .cloned()
                .unwrap_or(serde_json::json!({}));
            let tool_result = mcp.handle_tool_call(tool_name, &arguments);
            let is_error = tool_result.get("status").and_then(|s| s.as_str()) == Some("error");
            serde_json::json!({
                "content": [{
                    "type": "text",
                    "text": serde_json::to_string_pretty(&tool_result).unwrap_or_default()
                }],
                "isError": is_error
            })
        }
        "notifications/initialized" => return None,
        _ => {
            let error_response = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": -32601,
                    "message": format!("Method not found: {}", method)
                }
            });
            return Some(error_response.to_string());
        }
    };

    let response = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    });

    Some(response.to_string())
}

/// Answer requests from `reader` on `writer` until the input ends
fn serve_lines<R: BufRead, W: Write>(reader: R, mut writer: W, mcp: &ClipwrightMcp) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_jsonrpc_line(&line, mcp) {
            writeln!(writer, "{}", response).context("Failed to write response")?;
            writer.flush().context("Failed to flush response")?;
        }
    }
    Ok(())
}

/// Serve MCP over stdin/stdout
pub fn serve_stdio(mcp: &ClipwrightMcp) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_lines(stdin.lock(), stdout.lock(), mcp)
}

/// Handle a single client connection on the socket
fn handle_connection(stream: UnixStream, mcp: &ClipwrightMcp) {
    let reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(_) => return,
    };
    if let Err(e) = serve_lines(reader, stream, mcp) {
        debug!("connection closed: {:#}", e);
    }
}

/// Start the MCP socket server in a background thread.
/// Every connection shares the same session; tool calls are serialized on its lock.
pub fn start_socket_server(
    mcp: Arc<ClipwrightMcp>,
    path: &Path,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    // Remove stale socket file
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind {}", path.display()))?;

    // Non-blocking so we can check the shutdown flag periodically
    listener
        .set_nonblocking(true)
        .context("Failed to configure socket")?;
    info!("listening on {}", path.display());

    let path: PathBuf = path.to_path_buf();
    Ok(std::thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false).ok();
                    let mcp = mcp.clone();
                    std::thread::spawn(move || handle_connection(stream, &mcp));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("socket accept failed: {}", e);
                    break;
                }
            }
        }
        // Clean up socket file on shutdown
        let _ = std::fs::remove_file(&path);
    }))
}

/// Run as a stdio-to-socket proxy.
/// Forwards JSON-RPC from stdin to a running server's socket, responses back to stdout.
/// Returns Ok(()) on success, Err if the socket is not available.
pub fn run_as_proxy(path: &Path) -> Result<(), std::io::Error> {
    let stream = UnixStream::connect(path)?;
    let mut socket_reader = BufReader::new(stream.try_clone()?);
    let mut socket_writer = stream;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.is_empty() {
            continue;
        }

        // Forward request to socket
        writeln!(socket_writer, "{}", line)?;
        socket_writer.flush()?;

        // Check if this is a notification (no response expected)
        if let Ok(req) = serde_json::from_str::<serde_json::Value>(&line) {
            let method = req.get("method").and_then(|m| m.as_str()).unwrap_or("");
            if method.starts_with("notifications/") {
                continue;
            }
        }

        // Read response from socket and forward to stdout
        let mut response = String::new();
        socket_reader.read_line(&mut response)?;
        write!(stdout, "{}", response)?;
        stdout.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::event::EventLog;
    use crate::host::{ClipKind, Session};
    use crate::notation::TimeSignature;
    use parking_lot::{Mutex, RwLock};
    use serde_json::{json, Value};

    fn mcp() -> ClipwrightMcp {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        session.add_clip(track, 0.0, 8.0);
        ClipwrightMcp::new(
            Arc::new(Mutex::new(session)),
            Arc::new(RwLock::new(EventLog::new())),
            EngineConfig::with_holding_offset(1000.0),
        )
    }

    fn call(mcp: &ClipwrightMcp, request: Value) -> Value {
        let line = handle_jsonrpc_line(&request.to_string(), mcp).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let line = handle_jsonrpc_line("{not json", &mcp()).unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["error"]["code"], -32700);
    }

    #[test]
    fn unknown_method_is_reported() {
        let response = call(&mcp(), json!({ "jsonrpc": "2.0", "id": 3, "method": "resources/list" }));
        assert_eq!(response["id"], 3);
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn notifications_get_no_response() {
        let line = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string();
        assert!(handle_jsonrpc_line(&line, &mcp()).is_none());
    }

    #[test]
    fn tool_failures_set_is_error() {
        let mcp = mcp();
        let ok = call(
            &mcp,
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": { "name": "transform_clips", "arguments": { "clipIds": "1", "slice": "1:0", "seed": 2 } }
            }),
        );
        assert_eq!(ok["result"]["isError"], false);
        let text = ok["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["clipIds"].as_array().unwrap().len(), 2);

        let failed = call(
            &mcp,
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": { "name": "transform_clips", "arguments": {} }
            }),
        );
        assert_eq!(failed["result"]["isError"], true);
    }

    #[test]
    fn stream_serving_answers_each_request() {
        let input = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }).to_string(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
            String::new(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }).to_string(),
        ]
        .join("\n");
        let mut output = Vec::new();
        serve_lines(input.as_bytes(), &mut output, &mcp()).unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "clipwright");
        assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn socket_server_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipwright.sock");
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = start_socket_server(Arc::new(mcp()), &path, shutdown.clone()).unwrap();

        let stream = UnixStream::connect(&path).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        let request = json!({
            "jsonrpc": "2.0", "id": 9, "method": "tools/call",
            "params": { "name": "read_track", "arguments": { "track": 0 } }
        });
        writeln!(writer, "{}", request).unwrap();
        writer.flush().unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], 9);
        assert_eq!(response["result"]["isError"], false);

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert!(!path.exists());
    }
}
