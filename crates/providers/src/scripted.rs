//! A canned-response provider for tests.
//!
//! Replies are queued ahead of time and handed out in order; every request
//! the provider receives is kept so tests can assert on what was sent.
//! [`hold`](ScriptedProvider::hold) parks calls until released, which lets
//! tests observe how many requests are in flight at once.

use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider, StopReason};
use parking_lot::Mutex;
use pt_domain::error::{Error, Result};
use pt_domain::usage::Usage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Result<CompletionResponse>>>,
    seen: Mutex<Vec<CompletionRequest>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Park every following call after it is recorded, until
    /// [`release`](Self::release) lets it through.
    pub fn hold(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` parked (or future) calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(n);
        }
    }

    /// Calls currently inside `complete`.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls ever inside `complete` at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Queue a complete (non-truncated) reply.
    pub fn push_reply(&self, text: &str) {
        self.push_text(text, StopReason::EndTurn);
    }

    /// Queue a reply that hit the output ceiling.
    pub fn push_truncated(&self, text: &str) {
        self.push_text(text, StopReason::MaxTokens);
    }

    pub fn push_text(&self, text: &str, stop_reason: StopReason) {
        self.push_response(CompletionResponse {
            content: text.to_owned(),
            usage: Usage::default(),
            model: "scripted".into(),
            stop_reason,
        });
    }

    /// Queue a reply carrying specific usage counters.
    pub fn push_with_usage(&self, text: &str, usage: Usage) {
        self.push_response(CompletionResponse {
            content: text.to_owned(),
            usage,
            model: "scripted".into(),
            stop_reason: StopReason::EndTurn,
        });
    }

    pub fn push_response(&self, resp: CompletionResponse) {
        self.script.lock().push_back(Ok(resp));
    }

    pub fn push_error(&self, err: Error) {
        self.script.lock().push_back(Err(err));
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.seen.lock().last().cloned()
    }

    /// Queued replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        self.seen.lock().push(req);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.script.lock().pop_front().unwrap_or_else(|| {
            Err(Error::Provider {
                provider: self.id.clone(),
                message: "script exhausted".into(),
            })
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_come_back_in_order_then_exhaust() {
        let p = ScriptedProvider::new("s");
        p.push_reply("one");
        p.push_truncated("two");

        let a = p.complete(CompletionRequest::default()).await.unwrap();
        let b = p.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(a.content, "one");
        assert!(b.stop_reason.is_truncated());

        let err = p.complete(CompletionRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
        assert_eq!(p.requests().len(), 3);
        assert_eq!(p.remaining(), 0);
        assert_eq!(p.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn held_calls_wait_for_release() {
        let p = Arc::new(ScriptedProvider::new("s"));
        p.hold();
        p.push_reply("one");

        let call = {
            let p = p.clone();
            tokio::spawn(async move { p.complete(CompletionRequest::default()).await })
        };
        while p.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(p.remaining(), 1);

        p.release(1);
        let resp = call.await.unwrap().unwrap();
        assert_eq!(resp.content, "one");
        assert_eq!(p.in_flight(), 0);
    }
}
