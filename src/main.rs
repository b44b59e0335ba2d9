//! Bot entry point
//!
//! Wires the conversation engine to its collaborators and, until a real
//! WhatsApp transport is attached, drives it from the console: each stdin
//! line becomes an inbound message for a fixed sender, `/loc` shares
//! coordinates and `/foto` attaches an image file. Useful for exercising
//! the full flow (delays included) without risking a WhatsApp session.

use dotenvy::dotenv;
use reporta_bot::classifier::OpenAiClassifier;
use reporta_bot::config::Settings;
use reporta_bot::engine::ConversationEngine;
use reporta_bot::gateway::HttpGateway;
use reporta_bot::limits::RateLimiter;
use reporta_bot::monitor::TracingSink;
use reporta_bot::session::SessionStore;
use reporta_bot::transport::{ConsoleTransport, InboundMessage, StaticMedia};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Sender identity used for console conversations
const CONSOLE_SENDER: &str = "console";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    info!("🚀 Starting citizen-report intake bot...");
    info!("⚙️ Anti-ban measures active");

    let settings = init_settings();
    info!(
        "📊 Limits: {} messages/day, {} messages/hour, {} per sender/hour",
        settings.max_messages_per_day, settings.max_messages_per_hour,
        settings.max_messages_per_sender
    );

    let limiter = Arc::new(RateLimiter::new(
        settings.max_messages_per_day,
        settings.max_messages_per_sender,
    ));
    let engine = Arc::new(build_engine(&settings, limiter.clone()));

    spawn_stats_task(limiter.clone());

    tokio::select! {
        () = run_console(engine) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    info!("👋 Shutting down");
    info!("📊 Total messages processed today: {}", limiter.daily_count());
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_engine(settings: &Settings, limiter: Arc<RateLimiter>) -> ConversationEngine {
    let api_key = settings.openai_api_key.clone().unwrap_or_else(|| {
        // Classifier calls will fail and resolve fail-open, so reports
        // still go through without a key
        warn!("OPENAI_API_KEY not set; classifier will accept everything");
        String::new()
    });

    ConversationEngine::new(
        Arc::new(SessionStore::new()),
        limiter,
        Arc::new(OpenAiClassifier::new(api_key)),
        Arc::new(HttpGateway::new(settings)),
        Arc::new(ConsoleTransport),
    )
    .with_monitor(Arc::new(TracingSink))
}

/// Log volume statistics every hour, like the monitor panel expects
fn spawn_stats_task(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        interval.tick().await; // immediate first tick
        loop {
            interval.tick().await;
            info!(
                "📊 Daily messages: {} | active senders: {}",
                limiter.daily_count(),
                limiter.active_senders()
            );
        }
    });
}

async fn run_console(engine: Arc<ConversationEngine>) {
    println!("Console mode. Type a message, '/loc <lat> <lng>', '/foto <ruta> [mime]' or '/salir'.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line == "/salir" {
            break;
        }
        match parse_line(&line).await {
            Some(message) => engine.process(message).await,
            None => println!("(entrada no reconocida)"),
        }
    }
}

async fn parse_line(line: &str) -> Option<InboundMessage> {
    if let Some(rest) = line.strip_prefix("/loc ") {
        let mut parts = rest.split_whitespace();
        let latitude: f64 = parts.next()?.parse().ok()?;
        let longitude: f64 = parts.next()?.parse().ok()?;
        return Some(InboundMessage::text(CONSOLE_SENDER, "").with_location(latitude, longitude));
    }

    if let Some(rest) = line.strip_prefix("/foto ") {
        let mut parts = rest.split_whitespace();
        let path = parts.next()?;
        let mime = parts.next().unwrap_or("image/jpeg");
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Could not read {path}: {e}");
                return None;
            }
        };
        return Some(
            InboundMessage::text(CONSOLE_SENDER, "")
                .with_media(Box::new(StaticMedia::new(bytes, mime))),
        );
    }

    if line.is_empty() {
        return None;
    }
    Some(InboundMessage::text(CONSOLE_SENDER, line))
}
