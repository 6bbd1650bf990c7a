//! sitesync - incremental, atomic site deployment
//!
//! Compares a local directory tree against a server-side manifest of
//! content hashes, transfers only what changed over FTP, FTPS, SFTP or the
//! local filesystem, and switches the new state live with a rename dance
//! so a partial upload never shows through.

pub mod config;
pub mod deploy;
pub mod error;
pub mod filter;
pub mod hasher;
pub mod manifest;
pub mod preprocess;
pub mod runner;
pub mod scan;
pub mod server;

// Re-exports for convenience
pub use config::{Config, RemoteUrl, Scheme};
pub use deploy::{DeployOptions, DeploySummary, Deployer, Logger, NullLogger};
pub use error::{SitesyncError, SitesyncResult};
pub use filter::PathFilter;
pub use manifest::{Changes, Manifest};
pub use runner::{Job, JobRunner, Runner};
pub use server::{
    connect_with_retry, resolve_credentials, server_for_url, CredentialPrompt, Server,
    TerminalPrompt,
};
