pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod queries;
pub mod shell;

pub use client::{HhClient, Pause};
pub use config::{ApiSettings, Config, DbSettings, IngestSettings};
pub use error::AppError;
pub use queries::{PgReports, Reports};
