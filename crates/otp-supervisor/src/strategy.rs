//! Restart strategies.

/// How a supervisor reacts when one of its children goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Restart only the child that failed.
    OneForOne,
    /// Terminate every child (reverse declared order), then restart all
    /// (declared order).
    OneForAll,
    /// Terminate the children declared after the failed one (reverse
    /// order), then restart the failed one and those after it (declared
    /// order).
    RestForOne,
    /// Like `OneForOne`, but children are not declared up front — they are
    /// added dynamically with `start_child` from a shared template.
    SimpleOneForOne,
}

/// A snapshot entry returned by `which_children`.
#[derive(Debug, Clone)]
pub struct ChildSummary {
    pub id: String,
    pub pid: Option<otp_types::Pid>,
    pub kind: crate::child::ChildKind,
}
