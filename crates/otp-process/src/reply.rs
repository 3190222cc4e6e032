//! Deferred reply handle.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Token identifying an in-flight `call`. Replying is exactly-once: the
/// first [`ReplyToken::reply`] call wins, every later one is a no-op and
/// returns `false` (mirroring "a late reply is silently dropped").
pub struct ReplyToken<R> {
    inner: Arc<Mutex<Option<oneshot::Sender<R>>>>,
}

impl<R> ReplyToken<R> {
    /// Wraps a oneshot reply sender. Public so other behavior engines in
    /// the workspace (e.g. `otp-statem`) can build their own call
    /// protocols on the same exactly-once reply primitive.
    pub fn new(sender: oneshot::Sender<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Delivers `value` to the waiting caller, if nobody has replied yet.
    /// Returns `false` if this token already replied or the caller gave up
    /// (timed out and dropped its receiver).
    pub fn reply(&self, value: R) -> bool {
        match self.inner.lock().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// True once this token has already been used to reply.
    pub fn is_replied(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl<R> Clone for ReplyToken<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_is_exactly_once() {
        let (tx, rx) = oneshot::channel();
        let token = ReplyToken::new(tx);
        assert!(token.reply(1));
        assert!(!token.reply(2));
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cloned_token_shares_state() {
        let (tx, rx) = oneshot::channel();
        let token = ReplyToken::new(tx);
        let cloned = token.clone();
        assert!(cloned.reply(42));
        assert!(!token.reply(7));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
