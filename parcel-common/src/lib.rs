//! # Parcel Common Library
//!
//! Shared code for the land-acquisition GIS services:
//! - Parcel model and lifecycle stages
//! - SQLite schema initialization and repositories
//! - Bootstrap configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{Parcel, ParcelStatus};
