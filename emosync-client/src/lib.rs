//! # emosync-client: journal backend client for EMOSYNC
//!
//! The network half of the emotional-state distribution layer:
//!   - **Session**: login, registration, logout, restart restore and
//!     central 401 handling ([`SessionManager`])
//!   - **Endpoints**: entry submission, weather-state, mood history and
//!     journal paging ([`EmotionApi`])
//!   - **Polling**: cancellable periodic refresh that follows auth state
//!     ([`PollingScheduler`])
//!
//! Everything reaches the backend through the [`Transport`] trait;
//! [`HttpTransport`] is the reqwest implementation.
//!
//! ```text
//! SessionManager ──AuthChanged──► EventBus ──► PollingScheduler
//!        │                          ▲                │
//!        └──── authorized_request ◄─┼── EmotionApi ◄─┘
//!                                   └── EmotionReceived / WeatherReceived
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod error;
pub mod parse;
pub mod poller;
pub mod session;
pub mod transport;

pub use api::{EmotionApi, StateSource};
pub use error::ApiError;
pub use poller::{PollOutcome, PollStats, PollingScheduler};
pub use session::SessionManager;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, RequestBody, Transport};
