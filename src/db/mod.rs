//! Driver layer: pooled connections, query tracking, health, drain, retry.

pub mod drain;
pub mod driver;
pub mod health;
pub mod mongo;
pub mod retry;
pub mod tracker;
pub mod value;

pub use drain::{DrainOptions, DrainPhase, DrainResult};
pub use driver::{Driver, PoolStats, Tx};
pub use health::HealthStatus;
pub use mongo::MongoDriver;
pub use value::{QueryResult, Row, Value};
