//! Downloader configuration for integration tests

use media_dl::Config;
use std::path::Path;
use std::time::Duration;

/// Config rooted at `root` with small chunks and near-instant retries
pub fn test_config(root: &Path, chunk_size: u64) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.download.max_concurrent_downloads = 4;
    config.download.stats_interval = Duration::from_millis(100);
    config.cache.path = root.join(".media_dl").join("metadata.json");
    config.transfer.chunk_size = chunk_size;
    config.transfer.request_timeout = Duration::from_secs(5);
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.disk_space.enabled = false;
    config
}
