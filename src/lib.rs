//! Conversational intake pipeline for citizen pothole reports over WhatsApp.
//!
//! The crate is built around a per-sender finite-state machine
//! ([`engine::ConversationEngine`]) that collects a structured report
//! (description, location, photo) across multiple asynchronous messages,
//! gated by an AI content classifier and anti-abuse rate limiting, with
//! human-like timing simulation on every reply.
//!
//! The chat transport itself (connect, receive, media download) is an
//! external collaborator behind the [`transport`] seam.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod limits;
pub mod messages;
pub mod monitor;
pub mod session;
pub mod timing;
pub mod transport;
