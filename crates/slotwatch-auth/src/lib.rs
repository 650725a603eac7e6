pub mod client;
pub mod storage;
pub mod token_manager;

pub use client::{AuthClient, TokenResponse};
pub use storage::{Credential, CredentialCache, FileCredentialCache, MemoryCredentialCache};
pub use token_manager::{AccountCredentials, CredentialStore};
