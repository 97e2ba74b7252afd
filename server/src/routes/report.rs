//! Classification of received status reports

use serde_json::Value;
use std::fmt;

/// The kind of report announced in the `dataSource` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    VeepeakObd,
    ConnectionStatus,
    NetworkDiagnostics,
    DeviceStatus,
    DummyData,
    Other(Option<String>),
}

impl DataSource {
    pub fn of(report: &Value) -> Self {
        match report.get("dataSource").and_then(Value::as_str) {
            Some("veepeak_obd") => DataSource::VeepeakObd,
            Some("connection_status") => DataSource::ConnectionStatus,
            Some("network_diagnostics") => DataSource::NetworkDiagnostics,
            Some("device_status") => DataSource::DeviceStatus,
            Some("dummy_data") => DataSource::DummyData,
            other => DataSource::Other(other.map(str::to_string)),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::VeepeakObd => write!(f, "veepeak_obd"),
            DataSource::ConnectionStatus => write!(f, "connection_status"),
            DataSource::NetworkDiagnostics => write!(f, "network_diagnostics"),
            DataSource::DeviceStatus => write!(f, "device_status"),
            DataSource::DummyData => write!(f, "dummy_data"),
            DataSource::Other(Some(name)) => write!(f, "{}", name),
            DataSource::Other(None) => write!(f, "Unknown"),
        }
    }
}

/// Render a field the way it is logged; absent fields show as `undefined`
fn field(report: &Value, key: &str) -> String {
    match report.get(key) {
        None | Some(Value::Null) => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn vehicle_lines(report: &Value, lines: &mut Vec<String>) {
    lines.push(format!("  VIN: {}", field(report, "vin")));
    lines.push(format!("  Mileage: {} km", field(report, "mileage")));
    lines.push(format!("  RPM: {}", field(report, "rpm")));
    lines.push(format!("  Speed: {} km/h", field(report, "speed")));
    lines.push(format!("  Engine Temp: {}°C", field(report, "engineTemp")));
    lines.push(format!("  Fuel Level: {}%", field(report, "fuelLevel")));
    lines.push(format!("  Battery: {}V", field(report, "batteryVoltage")));
    lines.push(format!("  Data Quality: {}%", field(report, "dataQuality")));
}

/// Human-readable lines describing a report, by data source
pub fn describe(report: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let present = |key: &str| report.get(key).is_some_and(|v| !v.is_null());

    match DataSource::of(report) {
        DataSource::VeepeakObd => {
            lines.push("OBD Vehicle Data:".to_string());
            vehicle_lines(report, &mut lines);
            let pid = if present("odometerPID") {
                field(report, "odometerPID")
            } else {
                "N/A".to_string()
            };
            lines.push(format!("  Odometer PID: {}", pid));
        }
        DataSource::ConnectionStatus => {
            lines.push("Connection Status:".to_string());
            lines.push(format!("  Status: {}", field(report, "status")));
            lines.push(format!("  Veepeak Connected: {}", field(report, "veepeakConnected")));
            lines.push(format!("  Battery: {}V", field(report, "batteryVoltage")));
            lines.push(format!("  Boot Count: {}", field(report, "bootCount")));
            if present("errorMessage") {
                lines.push(format!("  Error: {}", field(report, "errorMessage")));
            }
            if present("troubleshooting") {
                lines.push(format!("  Troubleshooting: {}", field(report, "troubleshooting")));
            }
        }
        DataSource::NetworkDiagnostics => {
            lines.push("Network Diagnostics:".to_string());
            lines.push(format!("  Operator: {}", field(report, "operator")));
            lines.push(format!("  Signal: {}", field(report, "signal")));
            lines.push(format!("  SIM: {}", field(report, "sim")));
            lines.push(format!("  APN: {}", field(report, "apn")));
            lines.push(format!("  IP Address: {}", field(report, "ipAddress")));
            lines.push(format!("  Connected: {}", field(report, "isConnected")));
        }
        DataSource::DeviceStatus => {
            lines.push("Device Status Update:".to_string());
            lines.push(format!("  Status: {}", field(report, "status")));
            lines.push(format!("  Message: {}", field(report, "message")));
            lines.push(format!("  Battery: {}V", field(report, "batteryVoltage")));
            lines.push(format!("  Boot Count: {}", field(report, "bootCount")));
            if report.get("status").and_then(Value::as_str) == Some("device_not_connected") {
                lines.push("  Device Issue: OBD device not connected".to_string());
                lines.push("  Check: Veepeak power and WiFi broadcast".to_string());
            }
        }
        DataSource::DummyData => {
            lines.push("Dummy Vehicle Data (Veepeak Failed):".to_string());
            vehicle_lines(report, &mut lines);
            lines.push("  Note: This is dummy data - Veepeak device not connected".to_string());
        }
        DataSource::Other(_) => {
            lines.push("Raw Data:".to_string());
            let pretty = serde_json::to_string_pretty(report).unwrap_or_else(|_| report.to_string());
            lines.extend(pretty.lines().map(str::to_string));
        }
    }

    lines
}
