pub mod bridge;
pub mod completion;
pub mod metrics;
pub mod protocol;

pub use bridge::{bind_bridge, run_bridge, BridgeConfig, BridgeError, OperatorRequest};
pub use completion::{
    CompletionBackend, CompletionConfig, HttpCompletionClient, OfflineBackend, ReportError,
};
pub use metrics::{init_metrics, record_snapshot, serve_metrics};
pub use protocol::{AckMsg, CommandMsg, HelloMsg, IncomingMessage, ProtocolVersion, StateMsg};
