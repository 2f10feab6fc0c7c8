//! Database access shared by the parcel services

pub mod init;
pub mod parcels;
pub mod settings;

pub use init::init_database;
pub use parcels::{ParcelStore, SqliteParcelStore};
