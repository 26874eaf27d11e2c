use serde_json::Value;

/// Emit one audit line for a privileged attempt.
///
/// Audit events carry a stable field set under `target: "audit"` so they can
/// be filtered from operational logs. Details never include tokens, helper
/// file contents, or `Authorization` header values; callers pass only
/// repo/branch/PR identifiers and policy reasons.
pub fn audit(event_type: &str, operation: &str, source_ip: &str, success: bool, details: &Value) {
    let timestamp = chrono::Utc::now().to_rfc3339();
    if success {
        tracing::info!(
            target: "audit",
            %timestamp,
            event_type,
            operation,
            source_ip,
            success,
            details = %details,
        );
    } else {
        tracing::warn!(
            target: "audit",
            %timestamp,
            event_type,
            operation,
            source_ip,
            success,
            details = %details,
        );
    }
}
