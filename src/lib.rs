pub mod record;
pub mod payload;
pub mod traceback;
pub mod exception;
pub mod context;
pub mod enrich;
pub mod sink;
pub mod http_sink;
pub mod delivery;
pub mod layer;
pub mod middleware;

pub mod config;
pub mod init;

pub use config::SynchrologConfig;
pub use exception::{abort, HttpException};
pub use init::{init, init_tracing, init_with_sink, InitError, InitOptions};
pub use layer::SynchrologLayer;
pub use record::Severity;
