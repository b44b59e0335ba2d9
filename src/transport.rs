//! Chat-transport seam
//!
//! The actual WhatsApp client (connect, receive, media download, send) is
//! an external collaborator; the engine only sees the types and traits
//! defined here. A console transport is included for local dry runs of
//! the conversation flow without a WhatsApp session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// Errors crossing the transport boundary
#[derive(Debug, Error)]
pub enum TransportError {
    /// Downloading an attachment failed
    #[error("Media download failed: {0}")]
    Download(String),
    /// Sending a reply or presence signal failed
    #[error("Send failed: {0}")]
    Send(String),
}

/// Raw attachment payload with its declared MIME type
#[derive(Debug, Clone)]
pub struct Media {
    /// Attachment bytes
    pub bytes: Vec<u8>,
    /// Declared MIME type (may be empty)
    pub mime_type: String,
}

impl Media {
    /// Whether the declared content type is an image
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Lazy handle to a message attachment; the payload is only fetched when
/// the engine actually needs it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaHandle: Send + Sync {
    /// Download the attachment bytes and declared MIME type
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Download`] if the transfer fails.
    async fn download(&self) -> Result<Media, TransportError>;
}

/// Geographic coordinates carried by a location message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// One inbound message as the engine consumes it
pub struct InboundMessage {
    /// Stable per-user key provided by the transport
    pub sender: String,
    /// Text body (may be empty for media-only messages)
    pub text: String,
    /// Coordinates, when the message is a location share
    pub location: Option<Location>,
    /// Attachment handle, when the message carries media
    pub media: Option<Box<dyn MediaHandle>>,
    /// Arrival timestamp
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Plain text message
    #[must_use]
    pub fn text(sender: &str, text: &str) -> Self {
        Self {
            sender: sender.to_string(),
            text: text.to_string(),
            location: None,
            media: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach coordinates
    #[must_use]
    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(Location {
            latitude,
            longitude,
        });
        self
    }

    /// Attach a lazily downloadable media payload
    #[must_use]
    pub fn with_media(mut self, media: Box<dyn MediaHandle>) -> Self {
        self.media = Some(media);
        self
    }
}

/// Outbound side of the transport: presence signal and reply primitive
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Emit a "typing" presence signal to the sender's chat
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the signal cannot be emitted.
    async fn send_typing(&self, sender: &str) -> Result<(), TransportError>;

    /// Send a plain-text reply to the sender
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the reply cannot be delivered.
    async fn reply(&self, sender: &str, text: &str) -> Result<(), TransportError>;
}

/// Stdout-backed transport for exercising the conversation flow locally
#[derive(Default)]
pub struct ConsoleTransport;

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send_typing(&self, sender: &str) -> Result<(), TransportError> {
        debug!("⌨️ [{sender}] typing…");
        Ok(())
    }

    async fn reply(&self, sender: &str, text: &str) -> Result<(), TransportError> {
        println!("\n🤖 → {sender}:\n{text}\n");
        Ok(())
    }
}

/// In-memory media handle; used by the console transport and tests
pub struct StaticMedia {
    media: Media,
}

impl StaticMedia {
    /// Wrap already-downloaded bytes
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            media: Media {
                bytes,
                mime_type: mime_type.to_string(),
            },
        }
    }
}

#[async_trait]
impl MediaHandle for StaticMedia {
    async fn download(&self) -> Result<Media, TransportError> {
        Ok(self.media.clone())
    }
}
