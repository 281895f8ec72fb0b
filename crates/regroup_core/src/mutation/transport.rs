//! Transport contract between the dispatcher and the board server.

use crate::model::record::RecordId;
use crate::model::retro::DropIntent;
use crate::mutation::EndDraggingPayload;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Early server signal that the drop was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragAcknowledgement {
    pub drag_id: Option<String>,
    pub reflection_id: RecordId,
}

/// Everything the server sends back for one drop.
#[derive(Debug, Clone, PartialEq)]
pub struct DragResponse {
    pub acknowledgement: DragAcknowledgement,
    pub payload: EndDraggingPayload,
}

/// Transport-level failure of an end-drag request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Server refused the mutation.
    Rejected(String),
    /// Server could not be reached.
    Unavailable(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "end-drag mutation rejected: {reason}"),
            Self::Unavailable(reason) => write!(f, "board server unavailable: {reason}"),
        }
    }
}

impl Error for TransportError {}

/// Storage faults on the serving side surface as an unavailable server.
impl From<StoreError> for TransportError {
    fn from(value: StoreError) -> Self {
        Self::Unavailable(value.to_string())
    }
}

impl TransportError {
    /// Stable error code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "drag_rejected",
            Self::Unavailable(_) => "server_unavailable",
        }
    }
}

/// Sends end-drag intents to the authoritative board.
pub trait DragTransport {
    fn end_dragging(&mut self, intent: &DropIntent) -> Result<DragResponse, TransportError>;
}
