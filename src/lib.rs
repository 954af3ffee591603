// Public modules
pub mod types;
pub mod config;
pub mod error;
pub mod placement;
pub mod prometheus;
pub mod snapshot;
pub mod sink;
pub mod collector;

// Re-export commonly used items
pub use types::*;
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use error::SourceError;
pub use placement::{CredentialSource, KubePlacementSource, PlacementSource};
pub use prometheus::{parse_vector_response, MetricsSource, PrometheusSource};
pub use snapshot::Snapshot;
pub use sink::{LogSink, MemorySink, SnapshotSink};
pub use collector::{CollectorLoop, CycleOutcome, LoopState};
