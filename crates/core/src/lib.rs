#![warn(clippy::all, missing_docs)]

//! Core client logic for the PrestaServ services marketplace.
//!
//! This crate hosts the data models, configuration handling, session
//! persistence and the authenticated HTTP layer, plus the catalog and
//! contract services used by the terminal UI and any future frontends.

pub mod api;
#[allow(missing_docs)]
pub mod auth;
#[allow(missing_docs)]
pub mod catalog;
pub mod config;
#[allow(missing_docs)]
pub mod contracts;
pub mod error;
pub mod models;
pub mod session;

pub use api::{ApiClient, RequestOptions, SessionEvent};
pub use auth::AuthService;
pub use catalog::{service_types, ServiceCatalog};
pub use config::AppConfig;
pub use contracts::ContractService;
pub use error::{ApiError, ApiResult};
pub use models::{
    Contract, ContractStatus, LinkFilter, NewContract, NewProviderLink, NewService, NewUser,
    ProviderServiceLink, Rating, Service, Session, User, UserRole,
};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
