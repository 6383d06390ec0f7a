pub mod client;
pub mod config;
pub mod direction;
pub mod errors;
pub mod gate;
pub mod orchestrator;
pub mod os_kind;
pub mod probe;
pub mod selector;
pub mod session;
pub mod transfer;

pub use client::{DirectoryState, RemoteClient, SizeProbe};
pub use config::{EndpointSpec, HostDescriptor, SyncConfig, ThresholdConfig};
pub use direction::TransferDirection;
pub use errors::{ErrorCategory, SyncError};
pub use gate::{GateVerdict, ThresholdGate};
pub use orchestrator::{RunSummary, SyncOptions, SyncOrchestrator, TaskOutcome};
pub use os_kind::OsKind;
