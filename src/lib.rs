//! Client for a worker UI server: typed RPC calls plus a live, reconnecting view of
//! the worker state pushed over its updates channel

pub mod channel;
pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod rpc;
pub mod store;
pub mod validate;

#[cfg(test)]
mod testing;

pub use channel::{ChannelState, Connector, ReconnectPolicy, WebSocketConnector};
pub use config::ClientConfig;
pub use error::{
    ApiResult, ChannelError, ErrorClass, NetworkError, ResponseError, ServerMessage,
    ValidationError,
};
pub use models::{NodeDiagnostics, NodeFsm, NodeState, RegisteredMethod, WorkerConfig, WorkerState};
pub use registry::{StoreRegistry, WorkerStore, WORKER_STORE};
pub use rpc::RpcClient;
pub use store::{ReactiveStore, Subscription, Updates};
pub use validate::{
    is_valid_for_connection, is_valid_for_creation, validate_for_connection,
    validate_for_creation,
};
