//! # campus-server
//!
//! Host for the campus services. One binary runs any of them, picked by
//! `service.kind`:
//!
//! | Kind | Routes | Calls |
//! |------|--------|-------|
//! | `auth` | `POST /auth/student`, `POST /auth/professor` | student, professor |
//! | `student` | `/students` | |
//! | `professor` | `/professors` | |
//! | `course` | `/courses` | |
//! | `enrollment` | `/enrollments` | student, course |
//!
//! Each service signs its own tokens, publishes its public key at
//! `/.well-known/jwks.json` and verifies inbound tokens against whichever
//! service issued them. See [`campus_auth`] for the protocol.
//!
//! ```rust,no_run
//! use campus_auth::KeyStore;
//! use campus_server::{AppState, ServiceConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::load(None)?;
//! let keys = KeyStore::generate("1", 2048)?;
//! let state = AppState::new(&config, keys)?;
//! let listener = tokio::net::TcpListener::bind(config.service.bind).await?;
//! campus_server::serve(listener, state, std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod password;
pub mod routes;
pub mod state;
pub mod store;

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;

pub use app::build_router;
pub use config::{ConfigError, ServiceConfig, ServiceKind};
pub use error::{ServerError, ServerResult};
pub use password::{Argon2PasswordVerifier, PasswordVerifier};
pub use state::AppState;
pub use store::{InMemoryRecordStore, Record, RecordStore};

/// Serve `state`'s router on `listener` until `shutdown` resolves
///
/// In-flight requests finish before this returns.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let kind = state.kind();
    let addr = listener.local_addr()?;
    info!(service = %kind, %addr, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!(service = %kind, "Server stopped");
    Ok(())
}
