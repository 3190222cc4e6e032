//! Registry entry shape.

use otp_types::Pid;

/// One registered name -> reference binding. `R` is whatever the caller
/// registers under a name — typically a [`otp_process::ServerRef`], but the
/// registry itself only needs `pid` for identity and auto-cleanup.
#[derive(Debug, Clone)]
pub struct Entry<R> {
    pub name: String,
    pub pid: Pid,
    pub value: R,
    pub metadata: Option<serde_json::Value>,
    pub registered_at_ms: u64,
}
