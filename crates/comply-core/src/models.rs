//! Domain models for the compliance core.
//!
//! Enums are persisted as their SCREAMING_SNAKE_CASE names (`as_str`)
//! and parsed back with `FromStr`.

pub mod assignment;
pub mod audit;
pub mod institution;
pub mod invite;
pub mod lifecycle;
pub mod resource;
pub mod role;
pub mod user;
