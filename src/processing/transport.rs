use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use crate::error::{TransportError, TransportResult};

// TRANSPORT COMPONENT ---------------------------------------------------------

/// What a transport yielded on one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One complete inbound message.
    Message(String),
    /// Nothing pending right now.
    Idle,
    /// The peer closed the connection.
    Closed,
    /// The connection failed.
    Error(String),
}

/// Source of raw gaze messages. Polling never blocks.
pub trait GazeTransport: Send {
    fn open(&mut self) -> TransportResult<()>;
    fn is_open(&self) -> bool;
    fn poll(&mut self) -> TransportEvent;
    fn close(&mut self);
}

// IN-PROCESS TRANSPORT --------------------------------------------------------

/// Channel-backed transport. The paired [`ChannelFeeder`] plays the tracker.
pub struct ChannelTransport {
    receiver: Receiver<TransportEvent>,
    open: bool,
    refuse_open: bool,
}

#[derive(Clone)]
pub struct ChannelFeeder {
    sender: Sender<TransportEvent>,
}

impl ChannelFeeder {
    pub fn send(&self, message: impl Into<String>) -> bool {
        self.sender.send(TransportEvent::Message(message.into())).is_ok()
    }

    pub fn close(&self) -> bool {
        self.sender.send(TransportEvent::Closed).is_ok()
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.sender.send(TransportEvent::Error(reason.into())).is_ok()
    }
}

impl ChannelTransport {
    pub fn pair() -> (Self, ChannelFeeder) {
        let (sender, receiver) = channel();
        (
            Self {
                receiver,
                open: false,
                refuse_open: false,
            },
            ChannelFeeder { sender },
        )
    }

    /// A transport whose `open` always fails, like an unreachable tracker.
    pub fn unreachable() -> Self {
        let (transport, _feeder) = Self::pair();
        Self {
            refuse_open: true,
            ..transport
        }
    }
}

impl GazeTransport for ChannelTransport {
    fn open(&mut self) -> TransportResult<()> {
        if self.refuse_open {
            return Err(TransportError::NotConnected);
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn poll(&mut self) -> TransportEvent {
        if !self.open {
            return TransportEvent::Idle;
        }
        match self.receiver.try_recv() {
            Ok(event) => {
                if matches!(event, TransportEvent::Closed | TransportEvent::Error(_)) {
                    self.open = false;
                }
                event
            }
            Err(TryRecvError::Empty) => TransportEvent::Idle,
            Err(TryRecvError::Disconnected) => {
                self.open = false;
                TransportEvent::Closed
            }
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}
