//! Request envelope.

use crate::command::Command;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A command as it travels on the bus.
///
/// The envelope is kept loosely typed so that replies echo exactly the
/// `command`, `params` and `ticketId` that were received, even when the
/// command itself cannot be decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Command name, e.g. `CREATE_WORKER`.
    #[serde(default)]
    pub command: String,
    /// Command parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Caller-chosen correlation id echoed in every reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
}

impl Request {
    /// Attaches a correlation id.
    #[must_use]
    pub fn with_ticket(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    /// Decodes a request body.
    ///
    /// Python producers emit `str(dict)`, which quotes with `'`. When strict
    /// JSON parsing fails, the body is retried once with single quotes
    /// swapped for double quotes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`](crate::ProtocolError::Malformed)
    /// if neither form parses.
    pub fn decode(body: &[u8]) -> Result<Self> {
        match serde_json::from_slice(body) {
            Ok(request) => Ok(request),
            Err(strict) => {
                let text = String::from_utf8_lossy(body);
                if !text.contains('\'') {
                    return Err(strict.into());
                }
                Ok(serde_json::from_str(&text.replace('\'', "\""))?)
            }
        }
    }

    /// Encodes the request as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the params cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes the typed command carried by this envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is unknown or its params are invalid.
    pub fn command(&self) -> Result<Command> {
        Command::from_request(self)
    }
}
