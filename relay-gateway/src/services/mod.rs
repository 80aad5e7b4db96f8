//! Services layer: Credential Store backends, Token Authority, Policy Engine,
//! registries and the Relay Orchestrator.

mod database;
pub mod identity;
mod memory;
pub mod payload;
pub mod policy;
pub mod registry;
pub mod relay;
pub mod store;
pub mod token_authority;

pub use database::PgCredentialStore;
pub use identity::{IdentityError, IdentityService, LoginOutcome};
pub use memory::MemoryCredentialStore;
pub use policy::{PolicyEngine, PolicyError, ADMIN_ROLE};
pub use registry::{RegistryError, RelaySettings, UpstreamRegistry};
pub use relay::{RelayError, RelayOptions, RelayOrchestrator, RelayResult};
pub use store::{CredentialStore, StoreError};
pub use token_authority::{
    IssueKind, IssuedToken, Principal, TokenAuthority, TokenClaims, TokenError, TokenRequest,
};
