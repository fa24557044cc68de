//! Facts Client Library
//!
//! Guest-credentialed access to the dougsellers.dev facts API:
//! identity federation for temporary AWS keys, SigV4 request signing,
//! and the session state a page renders from.

pub mod config;
pub mod credentials;
pub mod facts;
pub mod session;
pub mod signer;
pub mod theme;
pub mod transport;

pub use config::FactsConfig;
pub use credentials::{AuthError, CredentialProvider, GuestCredentials, IdentityFederation};
pub use facts::{FactQuery, FactsClient, FetchError};
pub use session::{AuthState, FactResult, FactsSession};
pub use signer::{RequestSigner, SignError, SignedRequest, SigningRequest};
pub use theme::{Theme, ThemeStore};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
