use std::env;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub log: LogConfig,
    pub session: SessionConfig,
    pub monitor: MonitorConfig,
    pub reset: ResetConfig,
}

impl Config {
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Self::load)
    }

    fn load() -> Self {
        dotenv::dotenv().ok();
        Self {
            log: LogConfig::load(),
            session: SessionConfig::load(),
            monitor: MonitorConfig::load(),
            reset: ResetConfig::load(),
        }
    }
}

// --- MODULES ---

// LOG
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
}

impl LogConfig {
    fn load() -> Self {
        Self {
            level: get_env("MQDESK_LOG", "error"),
        }
    }
}

// SESSION
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Producer group the test producer registers under.
    pub producer_group: String,
    /// Queue count used when creating a topic.
    pub topic_queue_count: u32,
    /// Capacity of the channel carrying decoded messages to the observer.
    pub delivery_channel_capacity: usize,
}

impl SessionConfig {
    fn load() -> Self {
        Self {
            producer_group:            get_env("MQDESK_PRODUCER_GROUP", "DESK_ADMIN_PRODUCER_GROUP"),
            topic_queue_count:         get_env("MQDESK_TOPIC_QUEUES", "4"),
            delivery_channel_capacity: get_env("MQDESK_DELIVERY_CHAN_CAP", "1024"),
        }
    }
}

// MONITOR
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Max retained points; the oldest point is evicted past this.
    pub series_capacity: usize,
}

impl MonitorConfig {
    fn load() -> Self {
        Self {
            poll_interval_ms: get_env("MQDESK_MONITOR_POLL_MS", "3000"),
            series_capacity:  get_env("MQDESK_MONITOR_POINTS", "20"),
        }
    }
}

// RESET
#[derive(Debug, Clone)]
pub struct ResetConfig {
    /// When true, offset resets apply even while consumers are online.
    pub force: bool,
}

impl ResetConfig {
    fn load() -> Self {
        Self {
            force: get_env("MQDESK_RESET_FORCE", "true"),
        }
    }
}

// --- PRIVATE HELPER ---

fn get_env<T: std::str::FromStr>(key: &str, default: &str) -> T {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| format!("Config error: {} must be valid", key))
        .unwrap()
}
