//! Runtime configuration for a station refresh

use std::path::PathBuf;

use stationfeed_core::{DEFAULT_BATCH_SIZE, SinkTarget};

use crate::transform::DEFAULT_MAX_CAPACITY;

/// Divvy station information (GBFS 1.x)
pub const DEFAULT_FEED_URL: &str = "https://gbfs.divvybikes.com/gbfs/en/station_information.json";

/// Local artifact location
pub const DEFAULT_LOCAL_PATH: &str = "/tmp/data.csv";

/// Stations per shard when filtering in parallel
pub const DEFAULT_SHARD_SIZE: usize = 1024;

/// What to fetch, how to filter it, and where the CSV goes
#[derive(Debug, Clone)]
pub struct Config {
    pub feed_url: String,
    /// Stations with `capacity < max_capacity` are kept
    pub max_capacity: u32,
    /// Rows per CSV block
    pub batch_size: usize,
    /// Filter threads; 1 filters inline as stations are parsed
    pub workers: usize,
    pub shard_size: usize,
    pub sink: SinkTarget,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            max_capacity: DEFAULT_MAX_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 1,
            shard_size: DEFAULT_SHARD_SIZE,
            sink: SinkTarget::Local {
                path: PathBuf::from(DEFAULT_LOCAL_PATH),
            },
        }
    }
}

impl Config {
    /// Stations buffered before a parallel filter pass (0 = inline)
    pub fn window_size(&self) -> usize {
        if self.workers <= 1 {
            0
        } else {
            self.workers * self.shard_size.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.max_capacity, 12);
        assert_eq!(c.batch_size, 250);
        assert_eq!(c.workers, 1);
        assert!(c.feed_url.ends_with("station_information.json"));
        assert!(matches!(c.sink, SinkTarget::Local { ref path } if path == std::path::Path::new("/tmp/data.csv")));
    }

    #[test]
    fn window_only_with_parallel_workers() {
        let mut c = Config::default();
        assert_eq!(c.window_size(), 0);
        c.workers = 4;
        c.shard_size = 100;
        assert_eq!(c.window_size(), 400);
    }
}
