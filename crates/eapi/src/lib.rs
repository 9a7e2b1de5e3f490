//! Client core for Arista EOS eAPI.
//!
//! eAPI accepts CLI commands as a JSON-RPC 2.0 `runCmds` request over HTTP(S)
//! and returns one structured (JSON) or textual result per command. A batch
//! stops at its first failing command; the results of the commands that ran
//! before it are still returned.
//!
//! ## Architectural Layer
//!
//! **Protocol logic + port definitions.** This crate has no I/O dependencies.
//! It builds requests and interprets responses; the HTTP exchange is supplied
//! through the [`HttpClient`] trait by an infrastructure crate (`eapi-http`)
//! or a test double.
//!
//! ## Pipeline
//!
//! ```text
//! caller → normalize → RequestEnvelope::encode → Transport → decode → interpret → caller
//! ```
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestId`, `SessionName`) |
//! | [`types`] | Commands, formats, credentials, tri-state results |
//! | [`errors`] | Error taxonomy and retry classification |
//! | [`normalize`](mod@normalize) | Caller input → canonical [`Command`] |
//! | [`codec`] | JSON-RPC envelope encode/decode |
//! | [`interpret`](mod@interpret) | Response → per-command [`BatchResult`] |
//! | [`transport`] | [`HttpClient`] port and the eAPI [`Transport`] adapter |
//! | [`config`] | [`DeviceConfig`] |
//! | [`device`] | [`Device`] session |
//! | [`config_session`] | EOS configuration sessions |

pub mod codec;
pub mod config;
pub mod config_session;
pub mod device;
pub mod errors;
pub mod identifiers;
pub mod interpret;
pub mod normalize;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use codec::{decode, RawResponse, RequestEnvelope, RequestOptions, RpcError};
pub use config::{DeviceConfig, Protocol};
pub use config_session::ConfigSession;
pub use device::Device;
pub use errors::{CommandError, EapiError, RetryPolicy, TransportError};
pub use identifiers::{RequestId, SessionName};
pub use interpret::interpret;
pub use normalize::{expand_multiline, normalize, normalize_all, CommandInput};
pub use transport::{HttpClient, HttpRequest, HttpResponse, Transport};
pub use types::{
    ApiVersion, BatchResult, Command, CommandFailure, CommandOutcome, CommandOutput,
    CommandResult, Credentials, OutputFormat,
};
