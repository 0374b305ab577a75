//! blockcsi Cloud - Block storage API client
//!
//! The controller talks to the remote block storage API through two narrow
//! ports, [`VolumeApi`] and [`ServerApi`]. Two adapters implement them:
//!
//! - [`HttpClient`]: the production REST adapter
//! - [`MemoryBackend`]: a deterministic in-process store with the same
//!   contract, used by tests and the development mode of the plugin
//!
//! ```text
//! ┌──────────────────┐
//! │ VolumeController │
//! └────────┬─────────┘
//!          │ CloudClient { volumes, servers }
//!    ┌─────┴──────┐
//! ┌──▼───────┐ ┌──▼────────────┐
//! │HttpClient│ │ MemoryBackend │
//! └──────────┘ └───────────────┘
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod memory;

pub use api::{
    CloudClient, Server, ServerApi, Volume, VolumeApi, VolumeFilter, VolumeRequest, Zone,
};
pub use error::{ApiError, ApiResult};
pub use http::HttpClient;
pub use memory::{MemoryBackend, Operation};
