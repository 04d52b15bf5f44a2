use serde::{Deserialize, Serialize};

/// SMS waiting in the modem's outbound queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipients: Vec<String>,
    pub body: String,
}

impl OutboundMessage {
    pub fn new(recipients: Vec<String>, body: impl Into<String>) -> Self {
        Self {
            recipients,
            body: body.into(),
        }
    }

    pub fn to_one(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(vec![recipient.into()], body)
    }
}

/// Unread SMS listed from modem storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Storage slot, used to delete the message once handled
    pub index: u32,
    pub sender: String,
    pub body: String,
}
