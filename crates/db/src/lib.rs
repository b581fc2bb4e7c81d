pub mod connection;
pub mod draft_sync;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use draft_sync::DraftSyncService;
pub use repositories::{
    DraftRepository, InMemoryDraftRepository, RepositoryError, SqlDraftRepository,
};
