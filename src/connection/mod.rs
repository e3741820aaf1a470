//! Connection Module
//!
//! TNC connection specifications, lifecycle states and the workers that
//! drive each named connection.

pub mod factory;
pub mod kiss;
pub mod spec;
pub mod state;
pub mod worker;

pub use factory::{ConnectionFactory, DefaultConnectionFactory};
pub use kiss::KissConnection;
pub use spec::{ConnectionSpec, ConnectionSpecBuilder, Endpoint, Protocol, TransportType};
pub use state::ConnectionState;
pub use worker::{run_connection, Connection, FrameCallback, WorkerCore, WorkerExit};
