// VPN Steward - operator bot core for VPN client certificate lifecycle
// This exposes the core components for testing and integration

pub mod auth;
pub mod config;
pub mod executor;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod workflow;

// Re-export key types for easy access
pub use auth::{AdminRoster, Visibility};
pub use config::{config, init_config, VpnStewardConfig};
pub use executor::{CredentialBundle, ExecutorError, LifecycleExecutor, ScriptExecutor};
pub use store::{ClientRecord, ClientStore, StoreError};
pub use telemetry::init_telemetry;
pub use transport::{ChatTransport, ConsoleTransport};
pub use workflow::{Dispatcher, Event, Response};
