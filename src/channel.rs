//! Correlated request/response messaging between requester and owner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use data_error::{LoaderError, Result};

/// One encoded message on its way to a destination.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub destination: String,
    /// Where the answer is expected, if any.
    pub reply_to: Option<String>,
    pub correlation_id: Uuid,
    pub body: Vec<u8>,
}

/// The messaging primitives both protocol parties rely on.
pub trait MessageChannel: Send + Sync {
    /// Send `payload` to the request destination and block until the reply
    /// correlated by `correlation_id` arrives or the timeout elapses.
    fn request_response(
        &self,
        payload: Vec<u8>,
        correlation_id: Uuid,
    ) -> Result<Vec<u8>>;

    /// Like [`request_response`](Self::request_response), but a reply for
    /// which `accept` returns false is not the answer to this request.
    /// Channels that can keep waiting drop it and wait for the rest of the
    /// timeout; the fallback fails right away.
    fn request_response_matching(
        &self,
        payload: Vec<u8>,
        correlation_id: Uuid,
        accept: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<u8>> {
        let reply = self.request_response(payload, correlation_id)?;
        if accept(reply.as_slice()) {
            Ok(reply)
        } else {
            Err(LoaderError::Channel(format!(
                "reply for {} does not answer the request",
                correlation_id
            )))
        }
    }

    /// Answer a request received with `reply_to` and `correlation_id`.
    fn respond(
        &self,
        payload: Vec<u8>,
        reply_to: &str,
        correlation_id: Uuid,
    ) -> Result<()>;
}

/// In-process message bus with named queues.
///
/// Plain messages are queued per destination until someone receives them.
/// Replies are routed straight to the caller waiting for their
/// correlation id on that destination and are dropped when nobody waits
/// any more. A caller keeps its waiter until it is done, so replies that
/// arrive late for an earlier request reach it too.
#[derive(Default)]
pub struct LocalBus {
    queues: Mutex<HashMap<String, (Sender<Envelope>, Receiver<Envelope>)>>,
    waiters: DashMap<(String, Uuid), Sender<Vec<u8>>>,
}

impl LocalBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn queue(&self, destination: &str) -> (Sender<Envelope>, Receiver<Envelope>) {
        let mut queues = self.queues.lock();
        queues
            .entry(destination.to_owned())
            .or_insert_with(unbounded)
            .clone()
    }

    /// Receiving end of `destination`. Several consumers of one destination
    /// compete for its messages.
    pub fn subscribe(&self, destination: &str) -> Receiver<Envelope> {
        self.queue(destination).1
    }

    pub fn publish(&self, envelope: Envelope) -> Result<()> {
        let (sender, _) = self.queue(&envelope.destination);
        sender.send(envelope).map_err(|err| {
            LoaderError::Channel(format!(
                "failed to queue message for {}: {}",
                err.0.destination, err
            ))
        })
    }

    /// Messages waiting on `destination`.
    pub fn pending(&self, destination: &str) -> usize {
        self.queue(destination).1.len()
    }

    fn deliver_reply(
        &self,
        destination: &str,
        correlation_id: Uuid,
        body: Vec<u8>,
    ) -> Result<()> {
        let key = (destination.to_owned(), correlation_id);
        let Some(waiter) = self.waiters.get(&key).map(|w| w.value().clone())
        else {
            log::warn!(
                "bus: nobody waits for reply {} on {}, dropping it",
                correlation_id,
                destination
            );
            return Ok(());
        };
        if waiter.send(body).is_err() {
            log::warn!(
                "bus: caller of {} on {} went away before the reply arrived",
                correlation_id,
                destination
            );
        }
        Ok(())
    }

    /// A channel endpoint sending requests to `request_queue` and expecting
    /// replies on `response_queue`.
    pub fn client(
        self: &Arc<Self>,
        request_queue: impl Into<String>,
        response_queue: impl Into<String>,
        timeout: Duration,
    ) -> BusClient {
        BusClient {
            bus: Arc::clone(self),
            request_queue: request_queue.into(),
            response_queue: response_queue.into(),
            timeout,
        }
    }
}

/// [`MessageChannel`] over a [`LocalBus`].
#[derive(Clone)]
pub struct BusClient {
    bus: Arc<LocalBus>,
    request_queue: String,
    response_queue: String,
    timeout: Duration,
}

impl BusClient {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl MessageChannel for BusClient {
    fn request_response(
        &self,
        payload: Vec<u8>,
        correlation_id: Uuid,
    ) -> Result<Vec<u8>> {
        self.request_response_matching(payload, correlation_id, &|_| true)
    }

    fn request_response_matching(
        &self,
        payload: Vec<u8>,
        correlation_id: Uuid,
        accept: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<u8>> {
        let key = (self.response_queue.clone(), correlation_id);
        let (sender, receiver) = unbounded();
        if self.bus.waiters.insert(key.clone(), sender).is_some() {
            log::warn!(
                "bus: correlation {} was still awaited, replacing the waiter",
                correlation_id
            );
        }

        let sent = self.bus.publish(Envelope {
            destination: self.request_queue.clone(),
            reply_to: Some(self.response_queue.clone()),
            correlation_id,
            body: payload,
        });
        if let Err(err) = sent {
            self.bus.waiters.remove(&key);
            return Err(err);
        }

        let deadline = Instant::now() + self.timeout;
        let reply = loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(left) {
                Ok(body) if accept(body.as_slice()) => break Ok(body),
                Ok(_) => log::warn!(
                    "bus: dropping a stale reply for {} on {}",
                    correlation_id,
                    self.response_queue
                ),
                Err(err) => break Err(err),
            }
        };
        self.bus.waiters.remove(&key);
        match reply {
            Ok(body) => Ok(body),
            Err(RecvTimeoutError::Timeout) => Err(LoaderError::Timeout {
                correlation: correlation_id.to_string(),
                millis: self.timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(LoaderError::Channel(
                format!("reply channel of {} disconnected", correlation_id),
            )),
        }
    }

    fn respond(
        &self,
        payload: Vec<u8>,
        reply_to: &str,
        correlation_id: Uuid,
    ) -> Result<()> {
        self.bus.deliver_reply(reply_to, correlation_id, payload)
    }
}
