//! Health monitoring and metrics for pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Health metrics for a pipeline
///
/// Tracks various counters and timestamps to monitor pipeline health.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Number of buffers dropped because the outbound channel was full
    pub frame_drops: AtomicU64,

    /// Number of decode failures
    pub decode_failures: AtomicU64,

    /// Timestamp (as Unix microseconds) of the last successfully processed buffer
    pub last_frame_time: AtomicU64,

    /// Number of buffers successfully processed
    pub frames_processed: AtomicU64,

    /// Total bytes of data processed
    pub bytes_processed: AtomicU64,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        let now_micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        Self {
            frame_drops: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            last_frame_time: AtomicU64::new(now_micros),
            frames_processed: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
        }
    }

    /// Record a dropped buffer
    pub fn record_frame_drop(&self) {
        self.frame_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decode failure
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully processed buffer
    pub fn record_frame(&self, size: usize) {
        let now_micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        self.last_frame_time.store(now_micros, Ordering::Relaxed);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Get the number of dropped buffers
    pub fn frame_drops(&self) -> u64 {
        self.frame_drops.load(Ordering::Relaxed)
    }

    /// Get the number of decode failures
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Get the timestamp of the last buffer (Unix microseconds)
    pub fn last_frame_time(&self) -> u64 {
        self.last_frame_time.load(Ordering::Relaxed)
    }

    /// Get the number of buffers processed
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Get the total bytes processed
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    /// Calculate the drop rate as a percentage
    pub fn frame_drop_rate(&self) -> f64 {
        let drops = self.frame_drops();
        let processed = self.frames_processed();
        if processed == 0 {
            return 0.0;
        }
        (drops as f64 / processed as f64) * 100.0
    }

    /// Check if the pipeline has stalled (no buffers for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last_frame = self.last_frame_time();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        let elapsed_micros = now.saturating_sub(last_frame);
        elapsed_micros > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_processed: self.frames_processed(),
            frame_drops: self.frame_drops(),
            decode_failures: self.decode_failures(),
            bytes_processed: self.bytes_processed(),
            frame_drop_rate: self.frame_drop_rate(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub frames_processed: u64,
    pub frame_drops: u64,
    pub decode_failures: u64,
    pub bytes_processed: u64,
    pub frame_drop_rate: f64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} buffers ({} drops, {:.2}%), {} decode failures, {} bytes",
            self.frames_processed,
            self.frame_drops,
            self.frame_drop_rate,
            self.decode_failures,
            self.bytes_processed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_metrics() {
        let health = PipelineHealth::new();

        // Record some buffers
        health.record_frame(1000);
        health.record_frame(2000);
        health.record_frame(1500);

        assert_eq!(health.frames_processed(), 3);
        assert_eq!(health.bytes_processed(), 4500);
        assert_eq!(health.frame_drops(), 0);

        // Record some drops
        health.record_frame_drop();
        health.record_frame_drop();

        assert_eq!(health.frame_drops(), 2);
        assert!(health.frame_drop_rate() > 0.0);
    }

    #[test]
    fn test_decode_failures_counted() {
        let health = PipelineHealth::new();

        health.record_decode_failure();
        health.record_decode_failure();
        health.record_decode_failure();

        assert_eq!(health.decode_failures(), 3);
        // Decode failures are not drops
        assert_eq!(health.frame_drops(), 0);
    }

    #[test]
    fn test_stall_detection() {
        let health = PipelineHealth::new();

        // Should not be stalled immediately
        assert!(!health.is_stalled(Duration::from_secs(1)));

        // Record a buffer to update last_frame_time
        health.record_frame(1000);

        // Simulate stall by not recording buffers
        std::thread::sleep(Duration::from_millis(150));

        // Should be stalled after 150ms if threshold is 100ms
        assert!(health.is_stalled(Duration::from_millis(100)));
    }
}
