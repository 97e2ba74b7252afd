//! Operator-facing diagnosis for failed cycles

use crate::Endpoint;

/// Ordered troubleshooting suggestions shown when the peer cannot be reached
pub fn troubleshooting_steps(endpoint: &Endpoint) -> Vec<String> {
    vec![
        format!("Double-check the server IP: {}", endpoint.host()),
        format!("Confirm your server is running on port {}", endpoint.port()),
        "Check your computer's firewall settings".to_string(),
        "Try disabling any VPN on your computer".to_string(),
        "Make sure both devices are on the same network/subnet".to_string(),
        "Try restarting your server and router".to_string(),
    ]
}

/// Numbered checklist lines, starting at 1
pub fn checklist_lines(endpoint: &Endpoint) -> Vec<String> {
    troubleshooting_steps(endpoint)
        .into_iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect()
}

/// Warning shown when the peer accepted the connection but stayed silent
pub fn timeout_warning(timeout_ms: u64) -> String {
    format!("Server response timeout! (no data within {} ms)", timeout_ms)
}
