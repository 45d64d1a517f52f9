//! Suzhu (宿主) Runtime Host
//!
//! Embeds a managed, single-threaded-cooperative runtime on one dedicated
//! worker thread and exposes a thread-safe control and message-passing API
//! to arbitrary host threads: start the runtime, exchange tagged messages
//! with it synchronously or asynchronously, get notified of fatal unhandled
//! failures, and stop or restart it cleanly.
//!
//! # Example
//!
//! ```no_run
//! use suzhu::{EmbeddedProgram, FaultResult, OpaquePayload, Runtime, RuntimeHost};
//!
//! struct Echo;
//!
//! impl EmbeddedProgram for Echo {
//!     fn boot(&mut self, rt: &Runtime) -> FaultResult<()> {
//!         rt.bind("PING", |_rt, payload| Ok(payload));
//!         Ok(())
//!     }
//! }
//!
//! let host = RuntimeHost::new(|| Echo);
//! host.start(None).expect("bootstrap failed");
//! let reply = host.send_sync("PING", OpaquePayload::null());
//! assert!(reply.is_null());
//! host.stop(false);
//! ```

#![doc(html_root_url = "https://docs.rs/suzhu")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod host;
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use host::{
    CompletionHook, ExceptionHook, HostConfig, HostError, HostResult, RuntimeHost, ThreadState,
};
pub use runtime::{EmbeddedProgram, FaultResult, OpaquePayload, Runtime, RuntimeFault};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "Suzhu (宿主)";
