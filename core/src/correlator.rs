//! Request/response correlation over a one-way message channel.
//!
//! `window.postMessage` only carries messages in one direction. The
//! correlator tags each outgoing request with a fresh id, parks a oneshot
//! sender under that id, and settles it when a reply carrying the same id
//! comes back through [`Correlator::dispatch`]. Replies for unknown or
//! already-settled ids are dropped.

use futures::channel::oneshot;
use futures::future::{self, Either};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::RelayError;
use crate::protocol::{BridgeAction, BridgeRequest, Reply};
use crate::router::Action;

/// Transmit side of the boundary
pub trait Outbound {
    fn post(&self, message: Value) -> Result<(), RelayError>;
}

impl<O: Outbound + ?Sized> Outbound for std::rc::Rc<O> {
    fn post(&self, message: Value) -> Result<(), RelayError> {
        (**self).post(message)
    }
}

type Settle = oneshot::Sender<Result<Reply, RelayError>>;

struct PendingRequest {
    action: &'static str,
    created_at_ms: u64,
    settle: Settle,
}

pub struct Correlator<O, C> {
    outbound: O,
    clock: C,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, PendingRequest>>,
}

impl<O: Outbound, C: Clock> Correlator<O, C> {
    pub fn new(outbound: O, clock: C) -> Self {
        Self {
            outbound,
            clock,
            next_id: Cell::new(0),
            pending: RefCell::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    /// Send `action` across the boundary and wait for its reply.
    ///
    /// An `ERROR` reply is returned as [`RelayError::Remote`].
    pub async fn send(&self, action: BridgeAction, timeout: Duration) -> Result<Value, RelayError> {
        let name = action.name();
        let id = self.allocate_id();
        let (settle, settled) = oneshot::channel();

        self.pending.borrow_mut().insert(
            id,
            PendingRequest {
                action: name,
                created_at_ms: self.clock.now_ms(),
                settle,
            },
        );

        let message = BridgeRequest { id, action }
            .to_value()
            .map_err(|e| RelayError::Channel(e.to_string()));
        if let Err(e) = message.and_then(|message| self.outbound.post(message)) {
            self.pending.borrow_mut().remove(&id);
            return Err(e);
        }
        log::debug!("➡️  #{} {} sent", id, name);

        match future::select(settled, self.clock.sleep(timeout)).await {
            Either::Left((Ok(result), _)) => result.and_then(Reply::into_result),
            Either::Left((Err(oneshot::Canceled), _)) => Err(RelayError::Disconnected(name.to_string())),
            Either::Right(_) => {
                if let Some(expired) = self.pending.borrow_mut().remove(&id) {
                    log::warn!(
                        "⏱️  #{} {} expired after {} ms",
                        id,
                        expired.action,
                        self.clock.now_ms().saturating_sub(expired.created_at_ms)
                    );
                }
                Err(RelayError::Timeout {
                    action: name.to_string(),
                    after_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Settle the request tagged `id`. Returns `false` when nothing was waiting.
    pub fn dispatch(&self, id: u64, reply: Reply) -> bool {
        let Some(pending) = self.pending.borrow_mut().remove(&id) else {
            log::debug!("Ignoring reply for unknown request #{}", id);
            return false;
        };
        log::debug!("⬅️  #{} {} settled", id, pending.action);
        // the caller may have stopped listening; nothing else to do then
        let _ = pending.settle.send(Ok(reply));
        true
    }

    /// Abandon every outstanding request; waiting callers see `Disconnected`
    pub fn teardown(&self) {
        let abandoned: Vec<_> = self.pending.borrow_mut().drain().collect();
        if !abandoned.is_empty() {
            log::warn!("Abandoning {} pending request(s)", abandoned.len());
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}
