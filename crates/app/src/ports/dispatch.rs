//! Dispatch port, the one-way sink envelopes leave the engine through.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::envelope::AcquisitionEnvelope;
use crate::error::DispatchError;

/// Hands envelopes to the conversion pipeline.
///
/// Called concurrently from every device worker. Implementations must
/// return promptly; a failure is logged by the caller and never affects
/// the device's connection.
pub trait Dispatcher: Send + Sync + 'static {
    /// Hand over `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the pipeline cannot accept it.
    fn dispatch(&self, envelope: AcquisitionEnvelope) -> Result<(), DispatchError>;
}

impl<T: Dispatcher + ?Sized> Dispatcher for Arc<T> {
    fn dispatch(&self, envelope: AcquisitionEnvelope) -> Result<(), DispatchError> {
        (**self).dispatch(envelope)
    }
}

/// Dispatcher backed by a bounded tokio [`mpsc`] channel.
///
/// Never waits: a full queue drops the envelope with [`DispatchError::Full`].
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<AcquisitionEnvelope>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end of its queue.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AcquisitionEnvelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, envelope: AcquisitionEnvelope) -> Result<(), DispatchError> {
        self.sender.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DispatchError::Full,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}
