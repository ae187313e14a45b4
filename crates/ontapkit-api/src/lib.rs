// ontapkit-api: Async REST executor for ONTAP-style management APIs

pub mod client;
pub mod error;
pub mod job;
pub mod limiter;
pub mod operation;
pub mod transport;

pub use client::{RestClient, normalize_endpoint};
pub use error::{ApiError, ApiErrorKind, Error, classify};
pub use job::{JobLink, JobRecord, JobState};
pub use limiter::{ConcurrencyLimiter, RequestSlot};
pub use operation::{Method, Operation};
pub use transport::{
    BasicAuth, HttpRequest, HttpResponse, HttpTransport, PURPOSE_TAG_HEADER, TlsMode, Transport,
    TransportConfig,
};
