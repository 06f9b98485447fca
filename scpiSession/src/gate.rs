//! Turn asynchronous service request notifications into a one-shot blocking wait.
//!
//! The gate moves through `Idle -> Armed -> (Signaled | TimedOut) -> Idle`. Every arm creates a
//! new pending operation with its own id and its own single-slot channel, so the slot itself tags
//! the signal with its operation. The interrupt callback posts the status into the slot of the
//! operation that is armed at that moment. A callback that arrives after its operation timed out
//! or was disarmed, but before the next arm, finds either no operation or a dropped slot and is
//! absorbed without effect.
//!
//! The status byte carries no operation id. A service request that the instrument raised for an
//! earlier operation but that is delivered after the next arm cannot be told apart from the new
//! operation's request. Drivers disable the instrument's service request mask after every
//! operation, so that no request is outstanding when they arm again.

use std::{
    fmt::{self, Display},
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{InstrumentError, ServiceRequestHandler, StatusByte};

/// Unique id of one armed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(u64);

impl Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The phase the gate is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// No operation is outstanding.
    Idle,
    /// An operation is armed and nobody waits for it yet.
    Armed,
    /// A thread is blocked waiting for the armed operation.
    Waiting,
}

/// The operation that currently expects a service request.
struct PendingOperation {
    id: OperationId,
    mask: u8,
    slot: SyncSender<StatusByte>,
    // Taken out by the waiting thread, so a second wait finds `None`.
    receiver: Option<Receiver<StatusByte>>,
}

#[derive(Default)]
struct GateState {
    pending: Option<PendingOperation>,
    next_id: u64,
}

/// One-shot synchronous wait for an instrument's service request.
///
/// A gate is usually owned by a [`crate::Session`], which registers [`ServiceRequestGate::handler`]
/// with its transport. It can also be used on its own:
///
/// ```
/// use std::{sync::Arc, thread, time::Duration};
///
/// use scpisession::{ServiceRequestGate, StatusByte};
///
/// let gate = Arc::new(ServiceRequestGate::new());
/// let handler = gate.handler();
///
/// gate.arm(0x20).unwrap();
/// // The transport calls the handler on its own thread when SRQ is asserted.
/// thread::spawn(move || handler(StatusByte::new(0x60)));
///
/// let status = gate.wait(Duration::from_secs(1)).unwrap();
/// assert_eq!(status.bits(), 0x60);
/// ```
#[derive(Default)]
pub struct ServiceRequestGate {
    state: Mutex<GateState>,
}

impl ServiceRequestGate {
    /// Create a new, idle gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the gate for one service request.
    ///
    /// The `mask` is the status condition the caller enabled on the instrument. The gate does not
    /// interpret it, but reports it in timeouts and logs.
    ///
    /// Fails with [`InstrumentError::AlreadyArmed`] if another operation is still outstanding.
    pub fn arm(&self, mask: u8) -> Result<OperationId, InstrumentError> {
        let mut state = self.state.lock();
        if let Some(pending) = &state.pending {
            return Err(InstrumentError::AlreadyArmed(pending.id));
        }
        let id = OperationId(state.next_id);
        state.next_id += 1;
        let (slot, receiver) = mpsc::sync_channel(1);
        state.pending = Some(PendingOperation {
            id,
            mask,
            slot,
            receiver: Some(receiver),
        });
        debug!(%id, mask, "Armed service request");
        Ok(id)
    }

    /// Return to idle without waiting. Returns `true` if an operation was outstanding.
    ///
    /// A thread that is currently blocked in [`ServiceRequestGate::wait`] for the disarmed
    /// operation returns [`InstrumentError::NotArmed`].
    pub fn disarm(&self) -> bool {
        let pending = self.state.lock().pending.take();
        if let Some(pending) = &pending {
            debug!(id = %pending.id, "Disarmed service request");
        }
        pending.is_some()
    }

    /// Deliver a service request. This is the interrupt callback and never blocks.
    ///
    /// If no operation is armed, or the armed operation was already signaled, the signal is
    /// absorbed.
    pub fn notify(&self, status: StatusByte) {
        let state = self.state.lock();
        let Some(pending) = &state.pending else {
            debug!(%status, "Absorbed service request with no armed operation");
            return;
        };
        match pending.slot.try_send(status) {
            Ok(()) => trace!(id = %pending.id, %status, "Signaled service request"),
            Err(TrySendError::Full(_)) => {
                debug!(id = %pending.id, %status, "Absorbed repeated service request");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(id = %pending.id, %status, "Absorbed service request after wait ended");
            }
        }
    }

    /// Block until the armed operation is signaled or the timeout elapses.
    ///
    /// In both cases the gate returns to idle. On success, the status byte delivered with the
    /// service request is returned. Without an armed operation, this fails immediately with
    /// [`InstrumentError::NotArmed`], it never blocks forever or reports a stale success.
    pub fn wait(&self, timeout: Duration) -> Result<StatusByte, InstrumentError> {
        let (id, mask, receiver) = {
            let mut state = self.state.lock();
            let pending = state.pending.as_mut().ok_or(InstrumentError::NotArmed)?;
            let receiver = pending.receiver.take().ok_or(InstrumentError::NotArmed)?;
            (pending.id, pending.mask, receiver)
        };

        let result = match receiver.recv_timeout(timeout) {
            Ok(status) => Ok(status),
            Err(RecvTimeoutError::Timeout) => {
                Err(InstrumentError::TimeoutServiceRequest { mask, timeout })
            }
            Err(RecvTimeoutError::Disconnected) => Err(InstrumentError::NotArmed),
        };

        self.release(id);
        match &result {
            Ok(status) => debug!(%id, %status, "Service request received"),
            Err(err) => debug!(%id, %err, "Service request wait ended without signal"),
        }
        result
    }

    /// The current phase of the gate.
    pub fn phase(&self) -> GatePhase {
        match &self.state.lock().pending {
            None => GatePhase::Idle,
            Some(pending) if pending.receiver.is_some() => GatePhase::Armed,
            Some(_) => GatePhase::Waiting,
        }
    }

    /// Create the callback to register with a transport.
    pub fn handler(self: &Arc<Self>) -> ServiceRequestHandler {
        let gate = Arc::clone(self);
        Box::new(move |status| gate.notify(status))
    }

    /// Drop the pending operation if it is still the one with `id`.
    fn release(&self, id: OperationId) {
        let mut state = self.state.lock();
        if state.pending.as_ref().is_some_and(|pending| pending.id == id) {
            state.pending = None;
        }
    }
}
