//! Scripted in-process facilitators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use url::Url;

use crate::error::FacilitatorError;
use crate::facilitator::{FacilitatorClient, FacilitatorDescriptor, FacilitatorReply};
use crate::payment::PaymentRequest;

#[derive(Debug, Clone)]
pub enum Outcome {
    Reply(u16, serde_json::Value),
    Fail(FacilitatorError),
    /// Sleep this long, then reply 200.
    Slow(Duration),
}

/// Plays back outcomes in order, repeating the last one forever.
pub struct MockClient {
    script: Mutex<VecDeque<Outcome>>,
    calls: AtomicUsize,
}

impl MockClient {
    pub fn script(outcomes: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::script(vec![Outcome::Reply(200, serde_json::json!({"isValid": true}))])
    }

    pub fn status(code: u16) -> Arc<Self> {
        Self::script(vec![Outcome::Reply(code, serde_json::json!({"error": "upstream"}))])
    }

    pub fn failing(error: FacilitatorError) -> Arc<Self> {
        Self::script(vec![Outcome::Fail(error)])
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::script(vec![Outcome::Slow(delay)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }

    fn respond(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        let outcome = self.next();
        async move {
            match outcome {
                Outcome::Reply(status, body) => Ok(FacilitatorReply::new(status, body)),
                Outcome::Fail(e) => Err(e),
                Outcome::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(FacilitatorReply::ok(serde_json::json!({"late": true})))
                }
            }
        }
        .boxed()
    }
}

impl FacilitatorClient for MockClient {
    fn verify<'a>(
        &'a self,
        _: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>> {
        self.respond()
    }

    fn settle<'a>(
        &'a self,
        _: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>> {
        self.respond()
    }

    fn supported(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        self.respond()
    }

    fn list(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        self.respond()
    }
}

pub fn descriptor(id: &str, priority: i64) -> FacilitatorDescriptor {
    let url = Url::parse(&format!("https://{id}.example")).unwrap();
    FacilitatorDescriptor::new(id, format!("{id} facilitator"), priority, url)
}

pub fn entry(
    id: &str,
    priority: i64,
    client: Arc<MockClient>,
) -> (FacilitatorDescriptor, Arc<dyn FacilitatorClient>) {
    (descriptor(id, priority), client)
}
