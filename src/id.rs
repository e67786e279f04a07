//! Identifier helpers

use uuid::Uuid;

/// Generate a request ID for one top-level request
///
/// Format: `req-{uuid_v4}`
pub fn generate_request_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

/// Generate a tool call ID, `call-` followed by 12 hex chars
pub fn generate_call_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("call-{}", &simple[..12])
}
