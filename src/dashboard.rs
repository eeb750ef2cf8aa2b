use std::io;
use std::sync;

use slog_scope::{info, warn};

use std::io::Read;

use crate::options;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Process-wide store of the most recently received snapshot.  Explicit
/// read/write accessors around a mutex; contents do not survive restarts.
pub struct StatusCell {
    inner: sync::Mutex<Stored>,
}

struct Stored {
    fields: serde_json::Map<String, serde_json::Value>,
    server_time: Option<String>,
}

impl StatusCell {
    pub fn new() -> Self {
        let mut fields = serde_json::Map::new();
        for field in &[
            "last_watered",
            "next_scheduled",
            "rain_status",
            "system_mm_last_7d",
            "rain_mm_last_7d",
        ] {
            fields.insert((*field).to_owned(), serde_json::Value::Null);
        }
        fields.insert(
            "message".to_owned(),
            serde_json::Value::String("No status received yet.".to_owned()),
        );

        StatusCell {
            inner: sync::Mutex::new(Stored {
                fields,
                server_time: None,
            }),
        }
    }

    /// Merges a received JSON object into the cell and stamps the
    /// server-local receipt time.  Unknown fields are kept as-is, so newer
    /// reporters can send more than the dashboard knows about.
    pub fn apply(
        &self,
        body: &str,
        received: chrono::NaiveDateTime,
    ) -> Result<(), failure::Error> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        let object = match value {
            serde_json::Value::Object(object) => object,
            _ => return Err(failure::err_msg("expected a JSON object")),
        };

        let mut stored = self.lock();
        for (key, value) in object {
            stored.fields.insert(key, value);
        }
        stored.server_time = Some(received.format(TIME_FORMAT).to_string());

        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let stored = self.lock();

        let mut object = stored.fields.clone();
        object.insert(
            "system_time".to_owned(),
            stored
                .server_time
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        );

        serde_json::Value::Object(object)
    }

    pub fn render_html(&self) -> String {
        let stored = self.lock();

        let mut rows = String::new();
        for (label, key) in &[
            ("Last Watered", "last_watered"),
            ("Next Scheduled", "next_scheduled"),
            ("Rain Status", "rain_status"),
            ("Watered by System (last 7d, mm)", "system_mm_last_7d"),
            ("Rainfall (last 7d, mm)", "rain_mm_last_7d"),
            ("Message", "message"),
        ] {
            rows.push_str(&format!(
                "<li><b>{}:</b> {}</li>\n",
                label,
                display(stored.fields.get(*key))
            ));
        }
        rows.push_str(&format!(
            "<li><b>System Time (server):</b> {}</li>\n",
            stored.server_time.as_deref().unwrap_or("n/a")
        ));

        format!(
            "<html><head><title>Watering System Dashboard</title></head>\n\
             <body><h1>Watering System Status</h1>\n<ul>\n{}</ul></body></html>\n",
            rows
        )
    }

    fn lock(&self) -> sync::MutexGuard<Stored> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn display(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "n/a".to_owned(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Handles one status POST body; returns the HTTP status and JSON reply.
fn ingest(
    cell: &StatusCell,
    body: &str,
    received: chrono::NaiveDateTime,
) -> (u16, serde_json::Value) {
    if body.trim().is_empty() {
        return (400, serde_json::json!({ "error": "no JSON received" }));
    }

    match cell.apply(body, received) {
        Ok(()) => (200, serde_json::json!({ "ok": true })),
        Err(e) => (400, serde_json::json!({ "error": e.to_string() })),
    }
}

pub fn run(options: &options::DashboardOptions) -> Result<(), failure::Error> {
    let cell = StatusCell::new();
    let server = tiny_http::Server::http(&options.listen)
        .map_err(|e| failure::err_msg(format!("could not bind {}: {}", options.listen, e)))?;

    info!("dashboard listening"; "addr" => options.listen.as_str());

    for mut request in server.incoming_requests() {
        let now = chrono::Local::now().naive_local();
        let response = route(&cell, &mut request, now);
        if let Err(e) = request.respond(response) {
            warn!("could not send response: {}", e);
        }
    }

    Ok(())
}

fn route(
    cell: &StatusCell,
    request: &mut tiny_http::Request,
    now: chrono::NaiveDateTime,
) -> tiny_http::Response<io::Cursor<Vec<u8>>> {
    match (request.method(), request.url()) {
        (&tiny_http::Method::Post, "/api/status") => {
            let mut body = String::new();
            if request.as_reader().read_to_string(&mut body).is_err() {
                return json_response(400, &serde_json::json!({ "error": "unreadable body" }));
            }
            let (status, reply) = ingest(cell, &body, now);
            json_response(status, &reply)
        }
        (&tiny_http::Method::Get, "/") => html_response(cell.render_html()),
        (&tiny_http::Method::Get, "/api/status") => json_response(200, &cell.to_json()),
        _ => json_response(404, &serde_json::json!({ "error": "not found" })),
    }
}

fn json_response(status: u16, value: &serde_json::Value) -> tiny_http::Response<io::Cursor<Vec<u8>>> {
    tiny_http::Response::from_string(value.to_string())
        .with_status_code(status)
        .with_header(header("Content-Type", "application/json"))
}

fn html_response(body: String) -> tiny_http::Response<io::Cursor<Vec<u8>>> {
    tiny_http::Response::from_string(body)
        .with_header(header("Content-Type", "text/html; charset=utf-8"))
}

fn header(name: &str, value: &str) -> tiny_http::Header {
    // Infallible for the static names and values used here.
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
}
