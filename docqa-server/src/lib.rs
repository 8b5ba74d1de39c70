//! `docqa-server` exposes the document question-answering engine over HTTP.
//! Documents arrive as pre-extracted page text; answers cite their sources.

pub mod config;
pub mod server;

pub use config::{BackendConfig, PineconeSettings, ServerConfig};
pub use server::{ApiError, AppState, app_router, run_server};
