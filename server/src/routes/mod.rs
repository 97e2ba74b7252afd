//! Request routing for the status receiver

mod report;

pub use report::{describe, DataSource};

use bytes::Bytes;
use probe_shared::codec::{encode_response, HttpRequest};
use probe_shared::defaults;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

const JSON: &str = "application/json; charset=utf-8";
const HTML: &str = "text/html; charset=utf-8";

/// A response ready to be framed
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: JSON,
            body: value.to_string(),
        }
    }

    fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: HTML,
            body,
        }
    }

    /// Serialize into bytes on the wire
    pub fn encode(&self) -> Bytes {
        encode_response(self.status, self.content_type, self.body.as_bytes())
    }
}

/// Current UTC time as RFC 3339
pub fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Response for a request that could not be framed at all
pub fn malformed(reason: &str, now: &str) -> Response {
    Response::json(
        400,
        json!({
            "success": false,
            "message": "Malformed request",
            "error": reason,
            "timestamp": now,
        }),
    )
}

/// Dispatch a decoded request to its handler
pub fn route(req: &HttpRequest, now: &str) -> Response {
    info!("[{}] {} {}", now, req.method, req.path);
    info!("Content-Type: {}", req.header("Content-Type").unwrap_or("undefined"));
    info!("Content-Length: {}", req.header("Content-Length").unwrap_or("undefined"));

    match (req.method.as_str(), req.path.as_str()) {
        ("POST", defaults::STATUS_PATH) => receive_status(req, now),
        ("GET", "/health") => Response::json(
            200,
            json!({
                "status": "OK",
                "message": "ESP32 Data Receiver Server is running",
                "timestamp": now,
            }),
        ),
        ("GET", "/") => Response::html(index_page(now)),
        (method, path) => {
            warn!("No route for {} {}", method, path);
            Response::json(
                404,
                json!({
                    "success": false,
                    "message": format!("Cannot {} {}", method, path),
                    "timestamp": now,
                }),
            )
        }
    }
}

/// Parse the body as a JSON object, honouring JSON sent as `text/plain`
///
/// Returns `None` for anything that is not a non-empty object.
pub fn parse_report(req: &HttpRequest) -> Option<Value> {
    let media_type = req
        .header("Content-Type")
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());
    let text = req.body_text();

    let parseable = match media_type.as_deref() {
        Some("application/json") => true,
        Some("text/plain") => text.trim_start().starts_with('{'),
        _ => false,
    };
    if !parseable {
        return None;
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map)),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to parse JSON body: {}", e);
            None
        }
    }
}

fn receive_status(req: &HttpRequest, now: &str) -> Response {
    info!("Raw data: {}", req.body_text());
    info!("===== ESP32 DATA RECEIVED =====");
    info!("Time: {}", now);

    let Some(report) = parse_report(req) else {
        warn!("No JSON data received or failed to parse");
        return Response::json(
            400,
            json!({
                "success": false,
                "message": "No valid JSON data received",
                "timestamp": now,
            }),
        );
    };

    let device = report.get("deviceID").and_then(Value::as_str).unwrap_or("Unknown");
    info!("Device: {}", device);
    info!("Data Source: {}", DataSource::of(&report));
    for line in describe(&report) {
        info!("{}", line);
    }
    info!("================================");

    let echo = |key: &str| report.get(key).cloned().unwrap_or(Value::Null);
    Response::json(
        200,
        json!({
            "success": true,
            "message": "Data received successfully",
            "timestamp": now,
            "receivedData": {
                "deviceID": echo("deviceID"),
                "dataSource": echo("dataSource"),
                "timestamp": echo("timestamp"),
            },
        }),
    )
}

fn index_page(now: &str) -> String {
    format!(
        "<h1>ESP32 Vehicle Telematics Server</h1>\n\
         <p>Server is running and ready to receive data from ESP32</p>\n\
         <p><strong>Endpoints:</strong></p>\n\
         <ul>\n\
         <li><code>POST {}</code> - Receive ESP32 data</li>\n\
         <li><code>GET /health</code> - Health check</li>\n\
         </ul>\n\
         <p><strong>Server Time:</strong> {}</p>\n",
        defaults::STATUS_PATH,
        now
    )
}
