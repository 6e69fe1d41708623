use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use crate::command::{Command, CommandSource};
use crate::config::EngineConfig;
use crate::event::EventLog;
use crate::host::{ClipId, ClipKind, ClipSnapshot, Host, JournaledHost, Session};
use crate::notation::{to_duration_text, to_text};
use crate::project;
use crate::transform::{transform_clips, TransformError, TransformParams};

/// MCP server handler for clipwright
pub struct ClipwrightMcp {
    session: Arc<Mutex<Session>>,
    event_log: Arc<RwLock<EventLog>>,
    config: EngineConfig,
}

fn error_value(err: &TransformError) -> Value {
    json!({
        "status": "error",
        "error": err.kind(),
        "message": err.to_string()
    })
}

impl ClipwrightMcp {
    pub fn new(
        session: Arc<Mutex<Session>>,
        event_log: Arc<RwLock<EventLog>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            session,
            event_log,
            config,
        }
    }

    // === Transform Tools ===

    /// Run the transform engine. The session stays locked for the whole call.
    pub fn transform_clips(&self, args: &Value) -> Value {
        let params: TransformParams = match serde_json::from_value(args.clone()) {
            Ok(p) => p,
            Err(e) => {
                return error_value(&TransformError::validation(format!(
                    "Invalid parameters: {}",
                    e
                )))
            }
        };

        let mut session = self.session.lock();
        let mut host = JournaledHost::new(&mut *session, &self.event_log, CommandSource::Mcp);
        match transform_clips(&params, &mut host, &self.config) {
            Ok(result) => json!({
                "status": "ok",
                "clipIds": result.clip_ids,
                "seed": result.seed,
                "warnings": result.warnings
            }),
            Err(e) => error_value(&e),
        }
    }

    // === Query Tools ===

    /// Summarize a track and its arrangement clips
    pub fn read_track(&self, track: usize) -> Value {
        let session = self.session.lock();
        let Some(data) = session.tracks.get(track) else {
            return json!({
                "status": "error",
                "error": "not_found",
                "message": format!("No track at index {}", track)
            });
        };
        let sig = session.time_signature;

        let clips: Vec<Value> = data
            .arrangement
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "name": c.name,
                    "position": to_text(c.start_time, sig),
                    "length": to_duration_text(c.length(), sig),
                    "start_time": c.start_time,
                    "end_time": c.end_time,
                    "looping": c.looping
                })
            })
            .collect();
        let slots: Vec<Value> = data
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, c)| c.as_ref().map(|c| json!({ "slot": slot, "id": c.id })))
            .collect();

        json!({
            "status": "ok",
            "track": track,
            "name": data.name,
            "kind": data.kind.name(),
            "time_signature": format!("{}/{}", sig.numerator, sig.denominator),
            "clips": clips,
            "slots": slots
        })
    }

    /// Full property set of one clip, plus its notes for MIDI clips
    pub fn read_clip(&self, clip_id: &str) -> Value {
        let session = self.session.lock();
        let id = ClipId::new(clip_id.trim());
        let snapshot = match ClipSnapshot::read(&*session, &id) {
            Ok(s) => s,
            Err(e) => return error_value(&TransformError::from(e)),
        };
        let notes = match snapshot.kind {
            ClipKind::Midi => match session.get_notes(&id) {
                Ok(notes) => notes,
                Err(e) => return error_value(&TransformError::from(e)),
            },
            ClipKind::Audio => Vec::new(),
        };
        let sig = session.time_signature;
        json!({
            "status": "ok",
            "clip": snapshot,
            "position": to_text(snapshot.start_time, sig),
            "length": to_duration_text(snapshot.length(), sig),
            "notes": notes
        })
    }

    // === Event Query ===

    /// Get host mutations since a given ID. Holding-area staging is hidden
    /// unless `include_scratch` is set.
    pub fn get_events(&self, since_id: u64, include_scratch: bool) -> Value {
        let log = self.event_log.read();
        let events: Vec<_> = log
            .events_since(since_id)
            .into_iter()
            .filter(|e| include_scratch || !e.command.is_scratch(self.config.holding_offset))
            .collect();
        json!({
            "events": events,
            "latest_id": log.latest_id()
        })
    }

    // === Session I/O Tools ===

    /// Save the session to a JSON file
    pub fn save_session(&self, path_str: &str) -> Value {
        let path = Path::new(path_str);
        let session = self.session.lock();
        match project::save_session(&session, path) {
            Ok(()) => json!({
                "status": "ok",
                "path": path_str,
                "message": format!("Saved session to {}", path_str)
            }),
            Err(e) => json!({
                "status": "error",
                "error": "io_error",
                "message": format!("Failed to save: {:#}", e)
            }),
        }
    }

    /// Replace the session with one loaded from a JSON file
    pub fn load_session(&self, path_str: &str) -> Value {
        let path = Path::new(path_str);
        match project::load_session(path) {
            Ok(loaded) => {
                let tracks = loaded.tracks.len();
                *self.session.lock() = loaded;
                self.event_log.write().record(
                    Command::LoadSession {
                        path: path_str.to_string(),
                    },
                    CommandSource::Mcp,
                );
                json!({
                    "status": "ok",
                    "path": path_str,
                    "tracks": tracks,
                    "message": format!("Loaded session from {}", path_str)
                })
            }
            Err(e) => json!({
                "status": "error",
                "error": "io_error",
                "message": format!("Failed to load: {:#}", e)
            }),
        }
    }

    /// Handle an MCP tool call
    pub fn handle_tool_call(&self, tool: &str, args: &Value) -> Value {
        match tool {
            "transform_clips" => self.transform_clips(args),
            "read_track" => match args.get("track").and_then(|v| v.as_u64()) {
                Some(track) => self.read_track(track as usize),
                None => json!({ "status": "error", "error": "validation_error", "message": "Missing track" }),
            },
            "read_clip" => match args.get("clip_id").and_then(|v| v.as_str()) {
                Some(id) => self.read_clip(id),
                None => json!({ "status": "error", "error": "validation_error", "message": "Missing clip_id" }),
            },
            "get_events" => {
                let since_id = args.get("since_id").and_then(|v| v.as_u64()).unwrap_or(0);
                let include_scratch = args
                    .get("include_scratch")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.get_events(since_id, include_scratch)
            }
            "save_session" => match args.get("path").and_then(|v| v.as_str()) {
                Some(path) => self.save_session(path),
                None => json!({ "status": "error", "error": "validation_error", "message": "Missing path" }),
            },
            "load_session" => match args.get("path").and_then(|v| v.as_str()) {
                Some(path) => self.load_session(path),
                None => json!({ "status": "error", "error": "validation_error", "message": "Missing path" }),
            },
            _ => json!({ "status": "error", "error": "unknown_tool", "message": format!("Unknown tool: {}", tool) }),
        }
    }

    /// Get the list of available tools (for MCP discovery)
    pub fn list_tools() -> Value {
        json!({
            "tools": [
                {
                    "name": "transform_clips",
                    "description": "Randomize, slice, split and shuffle clips. Target clips by id list or by an arrangement range. Stages run in the order modify, slice, split, shuffle. Returns the resulting clip ids and the seed used.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "clipIds": {
                                "type": "string",
                                "description": "Comma-separated clip ids. Takes priority over the arrangement range."
                            },
                            "arrangementTrackIndex": {
                                "type": "integer",
                                "description": "Track to search for clips by start position"
                            },
                            "arrangementStart": {
                                "type": "string",
                                "description": "Range start as bar|beat (e.g., '1|1')"
                            },
                            "arrangementLength": {
                                "type": "string",
                                "description": "Range length as bars:beats (e.g., '4:0')"
                            },
                            "velocityMin": {
                                "type": "number",
                                "description": "Lower bound of the velocity offset added to each note"
                            },
                            "velocityMax": {
                                "type": "number",
                                "description": "Upper bound of the velocity offset added to each note"
                            },
                            "velocityRange": {
                                "type": "number",
                                "description": "Amount added to each note's velocity deviation"
                            },
                            "probability": {
                                "type": "number",
                                "description": "Amount added to each note's probability (result clamped to 0-1)"
                            },
                            "durationMin": {
                                "type": "number",
                                "description": "Lower bound of the note duration multiplier (> 0)"
                            },
                            "durationMax": {
                                "type": "number",
                                "description": "Upper bound of the note duration multiplier"
                            },
                            "gainDbMin": {
                                "type": "number",
                                "description": "Lower bound of the audio clip gain change in dB"
                            },
                            "gainDbMax": {
                                "type": "number",
                                "description": "Upper bound of the audio clip gain change in dB"
                            },
                            "transposeMin": {
                                "type": "number",
                                "description": "Lower bound of the transpose in semitones"
                            },
                            "transposeMax": {
                                "type": "number",
                                "description": "Upper bound of the transpose in semitones"
                            },
                            "transposeValues": {
                                "type": "string",
                                "description": "Comma-separated semitone offsets to pick from (e.g., '-12,0,7'). Wins over transposeMin/Max."
                            },
                            "slice": {
                                "type": "string",
                                "description": "Slice length as bars:beats (e.g., '1:0'). At most 64 slices per call."
                            },
                            "split": {
                                "type": "string",
                                "description": "Comma-separated bar|beat arrangement positions to cut at"
                            },
                            "shuffleOrder": {
                                "type": "boolean",
                                "description": "Randomly reorder the resulting clips on their tracks"
                            },
                            "seed": {
                                "type": "integer",
                                "description": "Random seed (0-4294967295). Derived from the clock if omitted."
                            }
                        }
                    }
                },
                {
                    "name": "read_track",
                    "description": "Get a track's name, kind and arrangement clips with their positions.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "track": {
                                "type": "integer",
                                "description": "Track index"
                            }
                        },
                        "required": ["track"]
                    }
                },
                {
                    "name": "read_clip",
                    "description": "Get all properties of a clip, and its notes for MIDI clips.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "clip_id": {
                                "type": "string",
                                "description": "Clip id"
                            }
                        },
                        "required": ["clip_id"]
                    }
                },
                {
                    "name": "get_events",
                    "description": "Get host mutations since an event ID. Holding-area staging calls are hidden unless include_scratch is true.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "since_id": {
                                "type": "integer",
                                "description": "Return events after this ID (0 for all)"
                            },
                            "include_scratch": {
                                "type": "boolean",
                                "description": "Include staging and shortener calls"
                            }
                        }
                    }
                },
                {
                    "name": "save_session",
                    "description": "Save the session to a JSON file.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "path": {
                                "type": "string",
                                "description": "File path to save to (e.g., 'set.json')"
                            }
                        },
                        "required": ["path"]
                    }
                },
                {
                    "name": "load_session",
                    "description": "Replace the session with one loaded from a JSON file.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "path": {
                                "type": "string",
                                "description": "File path to load from (e.g., 'set.json')"
                            }
                        },
                        "required": ["path"]
                    }
                }
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::TimeSignature;

    fn server() -> ClipwrightMcp {
        let mut session = Session::new(TimeSignature::default());
        let track = session.add_track("Keys", ClipKind::Midi);
        let clip = session.add_clip(track, 0.0, 16.0);
        session.add_note(&clip, 60, 0.0, 1.0, 100.0);
        ClipwrightMcp::new(
            Arc::new(Mutex::new(session)),
            Arc::new(RwLock::new(EventLog::new())),
            EngineConfig::with_holding_offset(1000.0),
        )
    }

    #[test]
    fn every_listed_tool_is_dispatched() {
        let mcp = server();
        let tools = ClipwrightMcp::list_tools();
        for tool in tools["tools"].as_array().unwrap() {
            let name = tool["name"].as_str().unwrap();
            let result = mcp.handle_tool_call(name, &json!({}));
            assert_ne!(result["error"], "unknown_tool", "{}", name);
        }
        let result = mcp.handle_tool_call("play", &json!({}));
        assert_eq!(result["error"], "unknown_tool");
    }

    #[test]
    fn slicing_through_the_tool() {
        let mcp = server();
        let result = mcp.handle_tool_call(
            "transform_clips",
            &json!({ "clipIds": "1", "slice": "1:0", "seed": 4 }),
        );
        assert_eq!(result["status"], "ok");
        assert_eq!(result["clipIds"].as_array().unwrap().len(), 4);
        assert_eq!(result["seed"], 4);

        let track = mcp.read_track(0);
        let positions: Vec<&str> = track["clips"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["position"].as_str().unwrap())
            .collect();
        assert_eq!(positions, vec!["1|1", "2|1", "3|1", "4|1"]);
    }

    #[test]
    fn engine_errors_come_back_as_tool_results() {
        let mcp = server();
        let result = mcp.handle_tool_call("transform_clips", &json!({ "clipIds": "1", "slice": "0:0.125" }));
        assert_eq!(result["status"], "error");
        assert_eq!(result["error"], "limit_exceeded");

        let result = mcp.handle_tool_call("transform_clips", &json!({ "clipIds": 1 }));
        assert_eq!(result["error"], "validation_error");

        let result = mcp.handle_tool_call("read_clip", &json!({ "clip_id": "99" }));
        assert_eq!(result["error"], "not_found");
    }

    #[test]
    fn read_track_requires_a_track_index() {
        let mcp = server();
        let result = mcp.handle_tool_call("read_track", &json!({}));
        assert_eq!(result["status"], "error");
        assert_eq!(result["error"], "validation_error");

        let result = mcp.handle_tool_call("read_track", &json!({ "track": 0 }));
        assert_eq!(result["status"], "ok");
        assert_eq!(result["name"], "Keys");

        let result = mcp.handle_tool_call("read_track", &json!({ "track": 3 }));
        assert_eq!(result["error"], "not_found");
    }

    #[test]
    fn events_hide_scratch_work_by_default() {
        let mcp = server();
        mcp.handle_tool_call(
            "transform_clips",
            &json!({ "clipIds": "1", "slice": "2:0", "seed": 4 }),
        );
        let all = mcp.get_events(0, true)["events"].as_array().unwrap().len();
        let visible = mcp.get_events(0, false)["events"].as_array().unwrap().len();
        assert!(visible > 0);
        assert!(visible < all);
    }

    #[test]
    fn read_clip_includes_notes() {
        let mcp = server();
        let result = mcp.read_clip("1");
        assert_eq!(result["status"], "ok");
        assert_eq!(result["length"], "4:0");
        assert_eq!(result["notes"].as_array().unwrap().len(), 1);
        assert_eq!(result["clip"]["kind"], "midi");
    }

    #[test]
    fn save_and_load_through_the_tools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.json");
        let path = path.to_str().unwrap();
        let mcp = server();

        assert_eq!(mcp.save_session(path)["status"], "ok");
        mcp.handle_tool_call("transform_clips", &json!({ "clipIds": "1", "slice": "1:0" }));
        assert_eq!(mcp.read_track(0)["clips"].as_array().unwrap().len(), 4);

        let loaded = mcp.load_session(path);
        assert_eq!(loaded["status"], "ok");
        assert_eq!(mcp.read_track(0)["clips"].as_array().unwrap().len(), 1);

        let events = mcp.get_events(0, false);
        let last = events["events"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["command"]["LoadSession"]["path"], path);
    }
}
