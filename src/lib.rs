//! XieCheng Coroutine Engine
//!
//! A stackful, cooperative coroutine runtime: a user-space scheduler that
//! lets a program suspend and resume independent logical threads of
//! control, each with its own execution stack, without involving the OS
//! scheduler.
//!
//! # Example
//!
//! ```no_run
//! use xiecheng::{run, Result};
//!
//! fn main() -> Result<()> {
//!     run(|rt| {
//!         rt.dispatch_fn(|| println!("on a dispatch worker"), None);
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! # Crate Features
//!
//! - `debug`: Enable extra runtime diagnostics

#![doc(html_root_url = "https://docs.rs/xiecheng")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod bridge;
pub mod coroutine;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use bridge::{AsyncEvent, Runtime, RuntimeConfig};
pub use coroutine::{Cid, Coroutine, CoroutineError, Scheduler, State};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name
pub const NAME: &str = "XieCheng (协程)";

/// Construct a default [`Runtime`] and run `f` as its outermost coroutine,
/// driving bridged operations until none remain pending.
pub fn run<F>(f: F) -> Result<Cid>
where
    F: FnOnce(&Runtime) + Send + 'static,
{
    tracing::debug!("starting coroutine runtime");
    let cid = bridge::run(f)?;
    Ok(cid)
}
