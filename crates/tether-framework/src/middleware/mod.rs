//! Ready-made middleware.
//!
//! - [`LoggingMiddleware`]: logs every invocation with its duration (any kind)
//! - [`PermissionMiddleware`]: checks member permission bits (commands)
//! - [`RecoverMiddleware`]: reports errors and panics to the user (commands)
//!
//! A typical command stack lists them outermost first:
//!
//! ```rust,ignore
//! CommandStack::new(Purge)
//!     .with(LoggingMiddleware)
//!     .with(RecoverMiddleware::new().contact(owner_id))
//!     .with(PermissionMiddleware::new())
//! ```

mod logging;
mod permission;
mod recover;

pub use logging::LoggingMiddleware;
pub use permission::PermissionMiddleware;
pub use recover::{RecoverMiddleware, RecoverService};
