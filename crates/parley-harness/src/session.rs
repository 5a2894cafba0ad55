//! Loopback session.
//!
//! Each request is stamped with a serial, encoded to CBOR, decoded on the
//! "server side", answered, and the response makes the same trip back. A
//! response whose serial does not match its request is reported as
//! [`TransportError::Correlation`].

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_client::{
    ClientId, ConversationError, ConversationQuery, Query, Session, TransportError,
};
use parley_proto::{ConversationData, Envelope, ErrorPayload, Response};
use tokio::sync::oneshot;

use crate::server::{LoopbackConfig, LoopbackServer};

/// Outcome forced on the next request.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Fail without a response. The server never sees the request.
    Fail(TransportError),
    /// Answer with an envelope-level error. The server never sees the
    /// request.
    Reject(ErrorPayload),
    /// Answer with this response instead of the server's. A response without
    /// a serial gets the request's serial.
    Respond(Response),
}

/// Handle releasing a held response.
#[derive(Debug)]
pub struct Hold {
    release: oneshot::Sender<()>,
}

impl Hold {
    /// Let the held request through to the server.
    pub fn release(self) {
        // A dropped receiver means the request was abandoned.
        let _ = self.release.send(());
    }
}

#[derive(Debug)]
struct Inner {
    server: LoopbackServer,
    next_serial: u32,
    script: VecDeque<Scripted>,
    held: Option<oneshot::Receiver<()>>,
    sent: Vec<Envelope>,
    queries: usize,
}

/// Client session bound to a [`LoopbackServer`].
///
/// Clones share the server; each clone keeps the client id it was created
/// with, so several clients can talk to one server.
#[derive(Debug, Clone)]
pub struct LoopbackSession {
    client_id: ClientId,
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackSession {
    /// Session for `client_id` on a fresh server.
    pub fn new(client_id: impl Into<ClientId>, config: LoopbackConfig) -> Self {
        Self {
            client_id: client_id.into(),
            inner: Arc::new(Mutex::new(Inner {
                server: LoopbackServer::new(config),
                next_serial: 1,
                script: VecDeque::new(),
                held: None,
                sent: Vec::new(),
                queries: 0,
            })),
        }
    }

    /// Session for another client on the same server.
    #[must_use]
    pub fn as_client(&self, client_id: impl Into<ClientId>) -> Self {
        Self { client_id: client_id.into(), inner: Arc::clone(&self.inner) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a conversation on the server.
    pub fn seed(&self, data: ConversationData) {
        self.lock().server.seed(data);
    }

    /// Server snapshot of a conversation as seen by this client.
    pub fn snapshot(&self, id: &str) -> Option<ConversationData> {
        self.lock().server.snapshot(id, self.client_id.as_str())
    }

    /// Run `f` against the server.
    pub fn with_server<R>(&self, f: impl FnOnce(&mut LoopbackServer) -> R) -> R {
        f(&mut self.lock().server)
    }

    /// Queue an outcome for a future request.
    pub fn script(&self, outcome: Scripted) {
        self.lock().script.push_back(outcome);
    }

    /// Fail the next request with `error`.
    pub fn fail_next(&self, error: TransportError) {
        self.script(Scripted::Fail(error));
    }

    /// Reject the next request with an envelope-level error.
    pub fn reject_next(&self, error: ErrorPayload) {
        self.script(Scripted::Reject(error));
    }

    /// Answer the next request with `response`.
    pub fn respond_next(&self, response: Response) {
        self.script(Scripted::Respond(response));
    }

    /// Hold the next request before it reaches the server.
    ///
    /// The request's future stays pending until the returned [`Hold`] is
    /// released or dropped.
    pub fn hold_next(&self) -> Hold {
        let (release, held) = oneshot::channel();
        self.lock().held = Some(held);
        Hold { release }
    }

    /// Every envelope sent so far, serials included.
    pub fn sent(&self) -> Vec<Envelope> {
        self.lock().sent.clone()
    }

    /// Number of envelopes sent.
    pub fn call_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Number of queries executed.
    pub fn query_count(&self) -> usize {
        self.lock().queries
    }

    fn exchange(&self, mut envelope: Envelope) -> Result<Request, TransportError> {
        let mut inner = self.lock();

        let serial = inner.next_serial;
        inner.next_serial = inner.next_serial.wrapping_add(1);
        envelope.serial = Some(serial);

        let mut bytes = Vec::new();
        envelope.encode(&mut bytes).map_err(|e| TransportError::Codec(e.to_string()))?;
        let decoded = Envelope::decode(&bytes).map_err(|e| TransportError::Codec(e.to_string()))?;

        inner.sent.push(decoded.clone());
        Ok(Request {
            envelope: decoded,
            serial,
            outcome: inner.script.pop_front(),
            held: inner.held.take(),
        })
    }

    fn answer(&self, request: Request) -> Result<Response, TransportError> {
        let response = match request.outcome {
            Some(Scripted::Fail(error)) => {
                tracing::debug!(serial = request.serial, error = %error, "scripted transport failure");
                return Err(error);
            },
            Some(Scripted::Reject(error)) => {
                Response { serial: Some(request.serial), ..Response::failure(error) }
            },
            Some(Scripted::Respond(mut response)) => {
                response.serial = response.serial.or(Some(request.serial));
                response
            },
            None => self.lock().server.handle(self.client_id.as_str(), request.envelope),
        };

        let mut bytes = Vec::new();
        response.encode(&mut bytes).map_err(|e| TransportError::Codec(e.to_string()))?;
        let response = Response::decode(&bytes).map_err(|e| TransportError::Codec(e.to_string()))?;

        if response.serial != Some(request.serial) {
            return Err(TransportError::Correlation {
                expected: request.serial,
                actual: response.serial,
            });
        }
        Ok(response)
    }
}

struct Request {
    envelope: Envelope,
    serial: u32,
    outcome: Option<Scripted>,
    held: Option<oneshot::Receiver<()>>,
}

impl Session for LoopbackSession {
    fn local_id(&self) -> ClientId {
        self.client_id.clone()
    }

    fn send(
        &self,
        envelope: Envelope,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        let session = self.clone();
        async move {
            let mut request = session.exchange(envelope)?;
            if let Some(held) = request.held.take() {
                tracing::debug!(serial = request.serial, "request held");
                // Release and drop both let the request through.
                let _ = held.await;
            }
            session.answer(request)
        }
    }
}

impl ConversationQuery for LoopbackSession {
    fn execute(
        &self,
        query: Query,
    ) -> impl Future<Output = Result<Vec<ConversationData>, ConversationError>> + Send {
        let session = self.clone();
        async move {
            let mut inner = session.lock();
            inner.queries += 1;

            let limit = query.limit.map_or(usize::MAX, |l| l as usize);
            let results: Vec<ConversationData> = inner
                .server
                .snapshots(session.client_id.as_str())
                .into_iter()
                .filter(|data| query.matches(data))
                .take(limit)
                .collect();
            drop(inner);

            Ok(results)
        }
    }
}
