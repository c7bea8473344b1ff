//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Open database → Build sealer → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     SIGINT/SIGTERM or trigger() → Stop accepting → Drain requests → Exit
//! ```

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{load_configuration, run, serve, StartupError};
