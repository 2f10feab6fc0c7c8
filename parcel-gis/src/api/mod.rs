//! HTTP API handlers for parcel-gis

pub mod auth;
pub mod feed;
pub mod health;
pub mod settings;
pub mod sync;

pub use auth::{auth_middleware, Caller, HttpSessionValidator, RejectAllSessions, SessionValidator};
pub use feed::feed_routes;
pub use health::health_routes;
pub use settings::settings_routes;
pub use sync::sync_routes;
