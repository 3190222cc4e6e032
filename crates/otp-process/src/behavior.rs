//! The `Behavior` trait: user-supplied `init`/`handle_call`/`handle_cast`/
//! `terminate` callbacks, wired to the process loop.

use async_trait::async_trait;

use otp_types::Reason;

use crate::reply::ReplyToken;

/// Result of a fallible handler invocation. `Err` is the Rust analogue of
/// an uncaught exception inside a handler: the process transitions to
/// `stopping` with reason `{error}` and `terminate` still runs, exactly as
/// if the handler had returned `Stop`.
pub type HandlerResult<T> = std::result::Result<T, String>;

/// What a `handle_call` invocation decided to do.
pub enum CallOutcome<Reply> {
    /// Reply now, keep running with the behavior's (already mutated) state.
    Reply(Reply),
    /// Do not reply; the caller will be answered later via the
    /// [`ReplyToken`] captured from `handle_call`'s `from` argument.
    Defer,
    /// Reply (if `Some`) then stop the process with `reason`.
    Stop { reason: Reason, reply: Option<Reply> },
}

/// A behavior: the callbacks a process loop drives.
///
/// `Message` is the single alphabet used for both `call` and `cast`
/// (matching Erlang's convention of one message type dispatched by the
/// handler, rather than the runtime). `Reply` is the call response type.
#[async_trait]
pub trait Behavior: Send + 'static {
    type Message: Send + 'static;
    type Reply: Send + 'static;

    /// Runs once before the process is considered `running`. Failures here
    /// are reported the same way as a handler failure once the process has
    /// partially started; most behaviors return `Ok(())` unconditionally.
    async fn init(&mut self) -> HandlerResult<()> {
        Ok(())
    }

    /// Handles a synchronous `call`. `from` may be cloned out of the
    /// handler and replied to later (the deferred-reply pattern).
    async fn handle_call(
        &mut self,
        msg: Self::Message,
        from: &ReplyToken<Self::Reply>,
    ) -> HandlerResult<CallOutcome<Self::Reply>>;

    /// Handles an asynchronous `cast`. No reply is possible.
    async fn handle_cast(&mut self, msg: Self::Message) -> HandlerResult<()>;

    /// Runs as the process transitions to `stopped`. Always invoked,
    /// including when the process is stopping because `terminate` itself
    /// is about to observe an error reason — a failure here is logged to
    /// the lifecycle bus but does not change the final reason.
    async fn terminate(&mut self, _reason: &Reason) {}
}
