//! `drydock-mssql` — SQL Server adapters behind the engine's capability
//! traits: a `sqlcmd` subprocess executor, the typed msdb Agent client, and
//! an `sc.exe` service controller.

pub mod agent;
pub mod executor;
mod proc;
pub mod service;
pub mod sqlcmd;

pub use agent::AgentClient;
pub use executor::{Row, SqlExecutor, Table};
pub use service::ScServiceController;
pub use sqlcmd::SqlcmdExecutor;
