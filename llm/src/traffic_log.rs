//! Traffic logging for backend API calls
//!
//! Logs every request/response to traffic.log next to the main log.
//! Only text blocks (truncated), tool names and image counts are written;
//! base64 image data never reaches the log.

use config::PathManager;
use serde_json::Value;
use std::io::Write;

/// Maximum characters to log for content
const MAX_CONTENT_LOG_CHARS: usize = 200;

/// Truncate a string for logging, adding ellipsis if truncated
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}... ({} chars total)", truncated, char_count)
    }
}

#[derive(Default)]
struct Summary {
    texts: Vec<String>,
    images: usize,
    offered: Vec<String>,
    calls: Vec<String>,
}

impl Summary {
    fn visit(&mut self, value: &Value) {
        match value {
            Value::Array(items) => items.iter().for_each(|item| self.visit(item)),
            Value::Object(map) => {
                match map.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = map.get("text").and_then(Value::as_str) {
                            self.texts
                                .push(truncate_for_log(text, MAX_CONTENT_LOG_CHARS));
                        }
                        return;
                    }
                    Some("image") => {
                        self.images += 1;
                        return;
                    }
                    Some("tool_use") => {
                        if let Some(name) = map.get("name").and_then(Value::as_str) {
                            self.calls.push(name.to_string());
                        }
                        return;
                    }
                    _ => {}
                }
                if let Some(Value::Array(tools)) = map.get("tools") {
                    self.offered.extend(
                        tools
                            .iter()
                            .filter_map(|t| t.get("name").and_then(Value::as_str))
                            .map(str::to_string),
                    );
                }
                for (key, child) in map {
                    if key != "tools" {
                        self.visit(child);
                    }
                }
            }
            _ => {}
        }
    }

    fn render(&self) -> String {
        let mut parts = Vec::new();
        if self.images > 0 {
            parts.push(format!("images={}", self.images));
        }
        if !self.offered.is_empty() {
            parts.push(format!("tools=[{}]", self.offered.join(", ")));
        }
        if !self.calls.is_empty() {
            parts.push(format!("tool_use=[{}]", self.calls.join(", ")));
        }
        for text in &self.texts {
            parts.push(format!("text={:?}", text));
        }
        parts.join(" ")
    }
}

fn summarize(value: &impl serde::Serialize) -> String {
    match serde_json::to_value(value) {
        Ok(value) => {
            let mut summary = Summary::default();
            summary.visit(&value);
            summary.render()
        }
        Err(_) => "<serialization error>".to_string(),
    }
}

/// Log a request (truncated summary only)
pub fn log_request(model: &str, request: &impl serde::Serialize) {
    log_traffic("REQUEST", &format!("[{}] {}", model, summarize(request)));
}

/// Log a response (truncated summary only)
pub fn log_response(model: &str, response: &impl serde::Serialize) {
    log_traffic("RESPONSE", &format!("[{}] {}", model, summarize(response)));
}

pub fn log_error(model: &str, error: &str) {
    log_traffic("ERROR", &format!("[{}] {}", model, error));
}

fn log_traffic(event_type: &str, message: &str) {
    let Some(log_path) = PathManager::traffic_log_path() else {
        return;
    };
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let _ = writeln!(file, "[{}] [TRAFFIC] [{}] {}", timestamp, event_type, message);
    }
}
