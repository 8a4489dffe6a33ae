use std::str::FromStr;
use std::time::Duration;

use league_queue::{MonitorConfig, QueueConfig, RateLimit, WorkerConfig};
use tracing::{debug, warn};

/// TTLs per entity class. Reference data changes a few times a season;
/// live scoring changes every minute during a gameweek. TTL is a
/// performance knob only - invalidation keeps the cache correct.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub reference: Duration,
    pub live: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            reference: Duration::from_secs(3600),
            live: Duration::from_secs(60),
        }
    }
}

/// Full service configuration. `Default` is a working local setup;
/// [`SyncConfig::from_env`] layers environment overrides on top.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub queue_name: String,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub monitor: MonitorConfig,
    pub cache: CacheTtls,
    pub maintenance_interval: Duration,
    pub scheduler_interval: Duration,
    /// Recurring full reference sync; `None` disables it
    pub bootstrap_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_name: "league-sync".to_string(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            monitor: MonitorConfig::default(),
            cache: CacheTtls::default(),
            maintenance_interval: Duration::from_secs(15),
            scheduler_interval: Duration::from_secs(1),
            bootstrap_interval: Some(Duration::from_secs(3600)),
        }
    }
}

impl SyncConfig {
    /// Build from defaults plus environment overrides. Keys follow the
    /// `PREFIX__SECTION__FIELD` convention, e.g.
    /// `LEAGUE__WORKER__CONCURRENCY=8` maps to `worker.concurrency`.
    /// Unknown keys and unparsable values are logged and skipped.
    pub fn from_env(prefix: &str) -> Self {
        let mut config = Self::default();
        for (key, value) in std::env::vars() {
            let Some(stripped) = key.strip_prefix(prefix) else {
                continue;
            };
            let normalized = stripped
                .trim_start_matches("__")
                .to_lowercase()
                .replace("__", ".");
            config.apply(&normalized, &value);
        }
        config
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "queue.name" => self.queue_name = value.to_string(),
            "queue.backoff_initial_ms" => {
                if let Some(ms) = parse(key, value) {
                    self.queue.backoff.initial = Duration::from_millis(ms);
                }
            }
            "queue.backoff_max_ms" => {
                if let Some(ms) = parse(key, value) {
                    self.queue.backoff.max = Duration::from_millis(ms);
                }
            }
            "queue.lock_duration_secs" => {
                if let Some(secs) = parse(key, value) {
                    self.queue.lock_duration = Duration::from_secs(secs);
                }
            }
            "queue.max_stalled_count" => {
                if let Some(count) = parse(key, value) {
                    self.queue.max_stalled_count = count;
                }
            }
            "queue.rate_limit_max" => {
                if let Some(max) = parse(key, value) {
                    self.rate_limit_mut().max = max;
                }
            }
            "queue.rate_limit_window_ms" => {
                if let Some(ms) = parse(key, value) {
                    self.rate_limit_mut().duration = Duration::from_millis(ms);
                }
            }
            "worker.concurrency" => {
                if let Some(concurrency) = parse(key, value) {
                    self.worker.concurrency = concurrency;
                }
            }
            "worker.poll_interval_ms" => {
                if let Some(ms) = parse(key, value) {
                    self.worker.poll_interval = Duration::from_millis(ms);
                }
            }
            "monitor.sample_interval_secs" => {
                if let Some(secs) = parse(key, value) {
                    self.monitor.sample_interval = Duration::from_secs(secs);
                }
            }
            "monitor.history_size" => {
                if let Some(size) = parse(key, value) {
                    self.monitor.history_size = size;
                }
            }
            "cache.reference_ttl_secs" => {
                if let Some(secs) = parse(key, value) {
                    self.cache.reference = Duration::from_secs(secs);
                }
            }
            "cache.live_ttl_secs" => {
                if let Some(secs) = parse(key, value) {
                    self.cache.live = Duration::from_secs(secs);
                }
            }
            "bootstrap_interval_secs" => {
                // 0 disables the recurring sync
                if let Some(secs) = parse::<u64>(key, value) {
                    self.bootstrap_interval =
                        (secs > 0).then(|| Duration::from_secs(secs));
                }
            }
            _ => debug!(key, "ignoring unknown config key"),
        }
    }

    fn rate_limit_mut(&mut self) -> &mut RateLimit {
        self.queue.rate_limit.get_or_insert(RateLimit {
            max: u32::MAX,
            duration: Duration::from_secs(1),
        })
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value, "unparsable config value, keeping default");
            None
        }
    }
}
