//! Configuration surface (spec §6).
//!
//! One struct per component, each `Default`-constructible from the
//! numeric defaults spec.md implies, with optional environment overrides
//! loaded via `dotenvy` the way the source repo's
//! `RuntimeConfig::resolve_sqlite_db_name` does.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    RoundRobin,
    Hash,
    Priority,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub partitions: usize,
    pub enable_backpressure: bool,
    pub backpressure_threshold: usize,
    pub partition_strategy: PartitionStrategy,
    pub metrics_interval: Duration,
    pub max_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            partitions: 10,
            enable_backpressure: true,
            backpressure_threshold: 10_000,
            partition_strategy: PartitionStrategy::RoundRobin,
            metrics_interval: Duration::from_secs(5),
            max_batch: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScalingRule {
    pub threshold: f64,
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub worker_timeout: Duration,
    pub health_check_interval: Duration,
    pub restart_threshold: u32,
    pub auto_scale: bool,
    pub scale_up: ScalingRule,
    pub scale_down: ScalingRule,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 16,
            worker_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(10),
            restart_threshold: 5,
            auto_scale: true,
            scale_up: ScalingRule {
                threshold: 0.8,
                cooldown: Duration::from_secs(30),
            },
            scale_down: ScalingRule {
                threshold: 0.2,
                cooldown: Duration::from_secs(60),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            retryable_errors: vec![
                "ETIMEDOUT".into(),
                "ECONNRESET".into(),
                "SERVICE_UNAVAILABLE".into(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_threshold: Duration,
    pub reset_timeout: Duration,
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_threshold: Duration::from_secs(5),
            reset_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetterQueueConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub retention_time: Duration,
}

impl Default for DeadLetterQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10_000,
            retention_time: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReportingConfig {
    pub enabled: bool,
    pub sample_rate: f64,
    pub max_errors_per_minute: u32,
}

impl Default for ErrorReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 1.0,
            max_errors_per_minute: 600,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorHandlerConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub dead_letter_queue: DeadLetterQueueConfig,
    pub error_reporting: ErrorReportingConfig,
}

#[derive(Debug, Clone)]
pub struct StreamingConfig {
    pub batch_size: usize,
    pub max_concurrent_writes: usize,
    pub idempotency_key_ttl: Duration,
    pub retry_policy: RetryConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            max_concurrent_writes: 8,
            idempotency_key_ttl: Duration::from_secs(300),
            retry_policy: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub entity_batch_size: usize,
    pub relationship_batch_size: usize,
    pub embedding_batch_size: usize,
    pub timeout: Duration,
    pub max_concurrent_batches: usize,
    pub streaming: StreamingConfig,
    pub enable_dag: bool,
    pub epoch_ttl: Duration,
    pub dependency_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            entity_batch_size: 500,
            relationship_batch_size: 500,
            embedding_batch_size: 100,
            timeout: Duration::from_secs(30),
            max_concurrent_batches: 4,
            streaming: StreamingConfig::default(),
            enable_dag: true,
            epoch_ttl: Duration::from_secs(300),
            dependency_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_ttl: Duration,
    pub checkpoint_interval: u64,
    pub max_events_per_session: u64,
    pub grace_ttl: Duration,
    pub enable_failure_snapshots: bool,
    pub pub_sub_channels: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            checkpoint_interval: 50,
            max_events_per_session: 100_000,
            grace_ttl: Duration::from_secs(120),
            enable_failure_snapshots: true,
            pub_sub_channels: vec!["sessions:global".into()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointJobConfig {
    pub concurrency: usize,
    pub retry_delay: Duration,
    pub max_attempts: u32,
}

impl Default for CheckpointJobConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry_delay: Duration::from_millis(500),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollbackConfig {
    pub max_rollback_points: usize,
    pub default_ttl: Duration,
    pub enable_persistence: bool,
    pub require_database_ready: bool,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            max_rollback_points: 200,
            default_ttl: Duration::from_secs(7 * 24 * 3600),
            enable_persistence: true,
            require_database_ready: false,
        }
    }
}

/// Config-driven alert thresholds for C5 (spec §4.5: "metrics and alerts
/// ... fire to subscribers"). Not itemized in the external config surface
/// table of spec §6 the way the other components are, so the numeric
/// defaults here follow the same conservative-default convention as the
/// rest of this file rather than a named spec constant.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub shutdown_timeout: Duration,
    pub metrics_interval: Duration,
    pub alert_queue_depth: usize,
    pub alert_error_rate: f64,
    pub alert_p95_latency: Duration,
    pub enrichment_priority: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(5),
            alert_queue_depth: 5_000,
            alert_error_rate: 0.1,
            alert_p95_latency: Duration::from_secs(2),
            enrichment_priority: 8,
        }
    }
}

/// Top-level configuration bag wiring every component's config surface
/// together, mirroring how the source repo's `RuntimeConfig` composes
/// `EventBusConfig`. Reads `KGRAPH_*` environment overrides via `dotenvy`
/// the same way `RuntimeConfig::resolve_sqlite_db_name` reads
/// `SQLITE_DB_NAME`.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    pub queue: QueueConfig,
    pub workers: WorkerPoolConfig,
    pub errors: ErrorHandlerConfig,
    pub batch: BatchConfig,
    pub pipeline: PipelineConfig,
    pub sessions: SessionConfig,
    pub checkpoint_job: CheckpointJobConfig,
    pub rollback: RollbackConfig,
    pub sqlite_db_name: Option<String>,
}

impl IngestConfig {
    /// Load defaults, then apply `KGRAPH_SQLITE_DB_NAME` and similar
    /// environment overrides if present (best-effort; a missing `.env`
    /// file is not an error).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(name) = std::env::var("KGRAPH_SQLITE_DB_NAME") {
            config.sqlite_db_name = Some(name);
        }
        if let Ok(n) = std::env::var("KGRAPH_QUEUE_PARTITIONS")
            && let Ok(n) = n.parse()
        {
            config.queue.partitions = n;
        }
        config
    }
}
