//! `lg-driver`: the behavior core of the rust_lg load-generation engine.
//!
//! # Components
//!
//! ```text
//! Driver ──owns──▶ User ×N ──owns──▶ Behavior tree (arena, one root)
//!                   │                    │
//!                   │ critical section   └──▶ OperationCell ×ops
//!                   │ (all tree changes)          │ step logic, validation
//!                   ▼                             ▼
//!             reset / replace               Transport ──callback──┘
//! ```
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`operation`] | `OperationLogic`, `OperationFactory`, `StepContext`, `Expect` |
//! | [`builder`]   | `DriverBuilder`                                            |
//! | [`driver`]    | `Driver`: population, active count, shutdown               |
//! | [`user`]      | `User`: activation, reset, replacement                     |
//! | [`behavior`]  | operation selection, sub-behaviors, stop cascade           |
//! | [`runner`]    | step execution, response validation, embedded fetches      |
//! | [`links`]     | embedded resource link discovery                           |
//! | [`cache`]     | `PageCache`, `BoundedPageCache`                            |
//! | [`observer`]  | `DriverObserver`, `NoopObserver`                           |
//! | [`error`]     | `DriverError`, `DriverResult<T>`                           |
//!
//! # Concurrency
//!
//! Operations run as tasks on one shared tokio runtime; nothing blocks a
//! worker waiting for another component.  Each user serializes changes to its
//! behavior tree behind one lock; users share nothing but the transport and
//! the statistics collector.  Stop requests travel as
//! `tokio_util::sync::CancellationToken`s (one per behavior, children derived
//! from parents) and are observed when a delay expires, when a step starts and
//! when a response arrives.  In-flight requests are never aborted.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                      |
//! |------------|-------------------------------------------------------------|
//! | `parallel` | `set_active_users` notifies users on Rayon's thread pool.   |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use lg_driver::{DriverBuilder, Expect, OperationLogic, StepContext, StepOutcome};
//!
//! let driver = DriverBuilder::new(config, Arc::new(registry), factory, transport)
//!     .stats(Arc::new(MemoryCollector::new()))
//!     .build()?;
//! driver.add_users("browse", 50)?;
//! driver.start(10);
//! tokio::time::sleep(Duration::from_secs(60)).await;
//! driver.complete();
//! ```

pub mod behavior;
pub mod builder;
pub mod cache;
pub mod driver;
pub mod error;
pub mod links;
pub mod observer;
pub mod operation;
pub mod runner;
pub mod user;

mod context;

#[cfg(test)]
mod tests;

pub use builder::DriverBuilder;
pub use cache::{BoundedPageCache, PageCache, PageCacheFactory, bounded_factory};
pub use driver::Driver;
pub use error::{DriverError, DriverResult};
pub use links::{EmbeddedLink, embedded_links};
pub use observer::{DriverObserver, NoopObserver};
pub use operation::{Expect, OperationFactory, OperationFailed, OperationLogic, StepContext, StepOutcome};
pub use user::User;
