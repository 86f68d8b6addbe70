#![allow(dead_code, unused_imports, unused_variables)]

pub mod config;
pub mod errors;
pub mod session;
pub mod transport;
pub mod utils;

use std::sync::Arc;
use std::time::Instant;
use crate::config::Config;
use crate::session::SessionManager;
use crate::transport::BrokerConnector;

// ========================================
// CONSOLE CORE (The Singleton)
// ========================================

/// The central brain of the ops console.
/// Owns the broker session; the presentation layer holds one of these.
/// Cheap to clone.
#[derive(Clone)]
pub struct ConsoleCore {
    pub session: Arc<SessionManager>,
    pub start_time: Instant,
}

impl ConsoleCore {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: &Config) -> Self {
        Self {
            session: Arc::new(SessionManager::new(connector, config.clone())),
            start_time: Instant::now(),
        }
    }
}

/// Install the global tracing subscriber.
/// `RUST_LOG` wins over the configured level; safe to call more than once.
pub fn init_logging(config: &Config) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
