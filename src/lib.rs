//! Client-side data layer for the HappyLifeNepal site.
//!
//! Typed access to the hosted backend ([`gateway`]), a keyed query cache
//! with shared fetches and retries ([`cache`]), realtime change
//! notifications that invalidate cached queries ([`realtime`]), and the page
//! and admin state built on top of them ([`views`]).

pub mod cache;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod infra;
pub mod realtime;
pub mod session;
pub mod views;

pub use happylife_types as types;
