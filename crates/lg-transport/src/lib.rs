//! `lg-transport`: the network boundary of the behavior core.
//!
//! The core never awaits a network call.  It hands a [`Request`] and a
//! [`ResponseCallback`] to a [`Transport`] and returns; the transport later
//! calls `completed` or `failed` from some other task.  This keeps thousands
//! of users on a small worker pool with no thread per user.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                      |
//! |---------------|---------------------------------------------------------------|
//! | [`request`]   | `Method`, `Body`, `FilePart`, `Request`, `Response`           |
//! | [`transport`] | `Transport` (callback style), `ResponseCallback`              |
//! | [`exchange`]  | `HttpExchange` (async), `SpawningTransport` adapter           |
//! | [`client`]    | `ReqwestExchange`: base-URL joining over `reqwest::Client`   |
//! | [`error`]     | `TransportError`, `TransportResult<T>`                        |

pub mod client;
pub mod error;
pub mod exchange;
pub mod request;
pub mod transport;


pub use client::ReqwestExchange;
pub use error::{TransportError, TransportResult};
pub use exchange::{HttpExchange, SpawningTransport};
pub use request::{Body, FilePart, Method, Request, Response};
pub use transport::{ResponseCallback, Transport};
