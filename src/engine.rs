//! Conversation engine
//!
//! Per-sender finite-state machine orchestrating rate limiting, session
//! state, classification, and report submission. Each inbound message is
//! handled to completion under that sender's lock, so two messages from
//! the same sender can never interleave a read-modify-write on the
//! session, while different senders may be processed concurrently.

use crate::classifier::ReportClassifier;
use crate::config::delays;
use crate::gateway::{encode_photo, ReportDraft, ReportGateway};
use crate::limits::RateLimiter;
use crate::messages;
use crate::monitor::{ActivityEvent, ActivitySink};
use crate::session::{ConversationState, Session, SessionStore};
use crate::timing;
use crate::transport::{ChatTransport, InboundMessage};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// The conversational intake state machine
pub struct ConversationEngine {
    sessions: Arc<SessionStore>,
    limiter: Arc<RateLimiter>,
    classifier: Arc<dyn ReportClassifier>,
    gateway: Arc<dyn ReportGateway>,
    transport: Arc<dyn ChatTransport>,
    monitor: Option<Arc<dyn ActivitySink>>,
    sender_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationEngine {
    /// Wire the engine to its collaborators
    #[must_use]
    pub fn new(
        sessions: Arc<SessionStore>,
        limiter: Arc<RateLimiter>,
        classifier: Arc<dyn ReportClassifier>,
        gateway: Arc<dyn ReportGateway>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            sessions,
            limiter,
            classifier,
            gateway,
            transport,
            monitor: None,
            sender_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attach an optional activity sink
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn ActivitySink>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Process one inbound message to completion.
    ///
    /// Never fails: throttling is a silent drop or a wait notice, and any
    /// unexpected handling error resets the session and apologizes.
    pub async fn process(&self, message: InboundMessage) {
        if message.text.is_empty() && message.media.is_none() && message.location.is_none() {
            debug!("⚠️ Empty message from {} ignored", message.sender);
            return;
        }

        info!("📨 New message from {}: {:?}", message.sender, message.text);

        // Daily cap: silent drop, no reply at all (anti-ban asymmetry)
        if !self.limiter.check_daily_limit() {
            warn!("⚠️ Daily limit reached, dropping message silently");
            return;
        }

        // Serialize per sender for the whole handler invocation
        let lock = self.sender_lock(&message.sender);
        let _guard = lock.lock().await;

        if !self.limiter.check_rate_limit(&message.sender) {
            self.record(&ActivityEvent::RateLimited {
                sender: message.sender.clone(),
            });
            tokio::time::sleep(delays::NOTICE_PAUSE).await;
            self.send_raw(&message.sender, &messages::rate_limited())
                .await;
            return;
        }

        let state = self.sessions.get(&message.sender).state;
        match self.handle_message(&message, state).await {
            Ok(()) => {
                self.record(&ActivityEvent::MessageProcessed {
                    sender: message.sender.clone(),
                    state,
                    response_time_ms: (Utc::now() - message.timestamp).num_milliseconds(),
                });
                self.limiter.increment_daily_count();
                debug!("📊 Messages today: {}", self.limiter.daily_count());
            }
            Err(e) => {
                error!("❌ Error processing message from {}: {e:#}", message.sender);
                self.record(&ActivityEvent::MessageFailed {
                    sender: message.sender.clone(),
                    error: format!("{e:#}"),
                });
                self.sessions.delete(&message.sender);
                tokio::time::sleep(delays::NOTICE_PAUSE).await;
                self.send_raw(&message.sender, &messages::internal_error())
                    .await;
            }
        }
    }

    async fn handle_message(&self, message: &InboundMessage, state: ConversationState) -> Result<()> {
        // Simulated reading pause before anything visible happens
        let read_text = if message.text.is_empty() {
            "mensaje"
        } else {
            &message.text
        };
        tokio::time::sleep(timing::read_delay(read_text)).await;

        match state {
            ConversationState::Initial => self.handle_initial(message).await,
            ConversationState::WaitingLocation => self.handle_waiting_location(message).await,
            ConversationState::WaitingPhoto => self.handle_waiting_photo(message).await,
            // Defensive: any state without a handler restarts the conversation
            ConversationState::ReadyToSubmit => self.handle_unknown_state(message).await,
        }
    }

    async fn handle_initial(&self, message: &InboundMessage) -> Result<()> {
        if messages::is_greeting(&message.text) {
            debug!("👋 Greeting detected");
            return self
                .send_typed_reply(&message.sender, &messages::initial_message())
                .await;
        }

        debug!("📝 Classifying report description");
        let verdict = self.classifier.classify(&message.text).await;

        if !verdict.accepted {
            info!("❌ Report rejected: {:?}", verdict.reason);
            // No fields stored; the sender may retry immediately
            return self
                .send_typed_reply(
                    &message.sender,
                    &messages::invalid_report(verdict.reason.as_deref()),
                )
                .await;
        }

        self.sessions.update(&message.sender, |s| {
            s.state = ConversationState::WaitingLocation;
            s.description = Some(message.text.clone());
        });

        self.send_typed_reply(&message.sender, &messages::location_request())
            .await
    }

    async fn handle_waiting_location(&self, message: &InboundMessage) -> Result<()> {
        let Some(location) = message.location else {
            return self
                .send_typed_reply(&message.sender, &messages::missing_location())
                .await;
        };

        info!(
            "📍 Location received: {}, {}",
            location.latitude, location.longitude
        );
        self.sessions.update(&message.sender, |s| {
            s.state = ConversationState::WaitingPhoto;
            s.latitude = Some(location.latitude);
            s.longitude = Some(location.longitude);
        });

        self.send_typed_reply(&message.sender, &messages::photo_request())
            .await
    }

    async fn handle_waiting_photo(&self, message: &InboundMessage) -> Result<()> {
        let Some(handle) = &message.media else {
            return self
                .send_typed_reply(&message.sender, &messages::missing_photo())
                .await;
        };

        let media = match handle.download().await {
            Ok(media) => media,
            Err(e) => {
                // Processing failure: report is lost, force a restart
                error!("❌ Media download failed: {e}");
                self.send_typed_reply(&message.sender, &messages::submission_error())
                    .await?;
                self.sessions.delete(&message.sender);
                return Ok(());
            }
        };

        if !media.is_image() {
            return self
                .send_typed_reply(&message.sender, &messages::not_an_image())
                .await;
        }

        let draft = self.assemble_draft(&message.sender, &media)?;
        match self.gateway.submit(&draft).await {
            Ok(id) => {
                self.send_typed_reply(&message.sender, &messages::success(&id))
                    .await?;
            }
            Err(e) => {
                error!("❌ Report submission failed: {e}");
                self.send_typed_reply(&message.sender, &messages::submission_error())
                    .await?;
            }
        }

        // Submitted or lost, either way the draft is gone and the next
        // message starts fresh
        self.sessions.delete(&message.sender);
        Ok(())
    }

    async fn handle_unknown_state(&self, message: &InboundMessage) -> Result<()> {
        warn!("🔄 Unknown state for {}, restarting", message.sender);
        self.sessions.delete(&message.sender);
        self.send_typed_reply(&message.sender, &messages::restart())
            .await
    }

    /// Re-read the session right before finalizing: the handler crossed
    /// suspension points since the state was first inspected.
    fn assemble_draft(&self, sender: &str, media: &crate::transport::Media) -> Result<ReportDraft> {
        let session: Session = self.sessions.get(sender);
        let description = session
            .description
            .ok_or_else(|| anyhow!("session has no description"))?;
        let latitude = session
            .latitude
            .ok_or_else(|| anyhow!("session has no latitude"))?;
        let longitude = session
            .longitude
            .ok_or_else(|| anyhow!("session has no longitude"))?;

        Ok(ReportDraft {
            description,
            latitude,
            longitude,
            photo: encode_photo(&media.bytes, &media.mime_type),
        })
    }

    /// Typing indicator, simulated typing pause, then the reply — in that
    /// order, so the cadence reads as human
    async fn send_typed_reply(&self, sender: &str, text: &str) -> Result<()> {
        self.transport.send_typing(sender).await?;
        tokio::time::sleep(timing::typing_delay(text.chars().count())).await;
        self.transport.reply(sender, text).await?;
        Ok(())
    }

    /// Best-effort send on paths that are already error handling
    async fn send_raw(&self, sender: &str, text: &str) {
        if let Err(e) = self.transport.reply(sender, text).await {
            error!("❌ Failed to send notice to {sender}: {e}");
        }
    }

    fn record(&self, event: &ActivityEvent) {
        if let Some(monitor) = &self.monitor {
            monitor.record(event);
        }
    }

    fn sender_lock(&self, sender: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .sender_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(sender.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, MockReportClassifier};
    use crate::gateway::MockReportGateway;
    use crate::transport::MockChatTransport;
    use mockall::predicate::{always, eq};

    struct EngineParts {
        sessions: Arc<SessionStore>,
        limiter: Arc<RateLimiter>,
        classifier: MockReportClassifier,
        gateway: MockReportGateway,
        transport: MockChatTransport,
    }

    impl EngineParts {
        fn new() -> Self {
            Self {
                sessions: Arc::new(SessionStore::new()),
                limiter: Arc::new(RateLimiter::new(200, 10)),
                classifier: MockReportClassifier::new(),
                gateway: MockReportGateway::new(),
                transport: MockChatTransport::new(),
            }
        }

        fn build(self) -> ConversationEngine {
            ConversationEngine::new(
                self.sessions,
                self.limiter,
                Arc::new(self.classifier),
                Arc::new(self.gateway),
                Arc::new(self.transport),
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_cap_drops_silently() {
        let mut parts = EngineParts::new();
        parts.limiter = Arc::new(RateLimiter::new(0, 10));
        parts.transport.expect_send_typing().times(0);
        parts.transport.expect_reply().times(0);
        let limiter = parts.limiter.clone();

        let engine = parts.build();
        engine.process(InboundMessage::text("591700", "hola")).await;

        // The dropped message is not counted as processed
        assert_eq!(limiter.daily_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_sender_cap_sends_wait_notice() {
        let mut parts = EngineParts::new();
        parts.limiter = Arc::new(RateLimiter::new(200, 0));
        parts.transport.expect_send_typing().times(0);
        parts
            .transport
            .expect_reply()
            .withf(|_, text| text.contains("espera unos minutos"))
            .times(1)
            .returning(|_, _| Ok(()));

        let engine = parts.build();
        engine.process(InboundMessage::text("591700", "hola")).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_replies_without_touching_session() {
        let mut parts = EngineParts::new();
        parts.classifier.expect_classify().times(0);
        parts
            .transport
            .expect_send_typing()
            .with(eq("591700"))
            .times(1)
            .returning(|_| Ok(()));
        parts
            .transport
            .expect_reply()
            .withf(|_, text| text.contains("Bienvenido al sistema de reportes"))
            .times(1)
            .returning(|_, _| Ok(()));
        let sessions = parts.sessions.clone();

        let engine = parts.build();
        engine
            .process(InboundMessage::text("591700", "Buenos Dias"))
            .await;

        assert_eq!(sessions.get("591700").state, ConversationState::Initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_keeps_state_and_reports_reason() {
        let mut parts = EngineParts::new();
        parts
            .classifier
            .expect_classify()
            .with(always())
            .times(1)
            .returning(|_| Classification {
                accepted: false,
                reason: Some("No es un problema de pavimento".to_string()),
            });
        parts
            .transport
            .expect_send_typing()
            .returning(|_| Ok(()));
        parts
            .transport
            .expect_reply()
            .withf(|_, text| text.contains("No es un problema de pavimento"))
            .times(1)
            .returning(|_, _| Ok(()));
        let sessions = parts.sessions.clone();

        let engine = parts.build();
        engine
            .process(InboundMessage::text(
                "591700",
                "hay un perro muerto en la calle",
            ))
            .await;

        assert_eq!(sessions.get("591700"), Session::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_description_advances_to_waiting_location() {
        let mut parts = EngineParts::new();
        parts
            .classifier
            .expect_classify()
            .times(1)
            .returning(|_| Classification::fail_open());
        parts
            .transport
            .expect_send_typing()
            .returning(|_| Ok(()));
        parts
            .transport
            .expect_reply()
            .withf(|_, text| text.contains("ubicación"))
            .times(1)
            .returning(|_, _| Ok(()));
        let sessions = parts.sessions.clone();
        let limiter = parts.limiter.clone();

        let engine = parts.build();
        engine
            .process(InboundMessage::text(
                "591700",
                "Hay un bache gigante en la Av. X",
            ))
            .await;

        let session = sessions.get("591700");
        assert_eq!(session.state, ConversationState::WaitingLocation);
        assert_eq!(
            session.description.as_deref(),
            Some("Hay un bache gigante en la Av. X")
        );
        assert_eq!(limiter.daily_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserved_state_restarts_conversation() {
        let mut parts = EngineParts::new();
        parts
            .transport
            .expect_send_typing()
            .returning(|_| Ok(()));
        parts
            .transport
            .expect_reply()
            .withf(|_, text| text.contains("Bienvenido al sistema de reportes"))
            .times(1)
            .returning(|_, _| Ok(()));
        let sessions = parts.sessions.clone();
        sessions.update("591700", |s| {
            s.state = ConversationState::ReadyToSubmit;
            s.description = Some("stale".to_string());
        });

        let engine = parts.build();
        engine
            .process(InboundMessage::text("591700", "cualquier cosa"))
            .await;

        assert_eq!(sessions.get("591700"), Session::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_resets_session_and_apologizes() {
        let mut parts = EngineParts::new();
        parts
            .classifier
            .expect_classify()
            .returning(|_| Classification::fail_open());
        parts
            .transport
            .expect_send_typing()
            .returning(|_| Ok(()));
        // The typed reply fails, then the apology goes out raw
        parts
            .transport
            .expect_reply()
            .withf(|_, text| text.contains("ubicación"))
            .times(1)
            .returning(|_, _| {
                Err(crate::transport::TransportError::Send(
                    "connection closed".to_string(),
                ))
            });
        parts
            .transport
            .expect_reply()
            .withf(|_, text| text.contains("Disculpa"))
            .times(1)
            .returning(|_, _| Ok(()));
        let sessions = parts.sessions.clone();

        let engine = parts.build();
        engine
            .process(InboundMessage::text("591700", "Hay un bache en la esquina"))
            .await;

        assert_eq!(sessions.get("591700"), Session::default());
    }
}
