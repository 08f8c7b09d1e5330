//! Marquee Kernel Library
//!
//! Filter-to-SQL compilation, hierarchy expansion and batched hydration
//! for the media library tables. The `marquee` binary is a thin command
//! line front end over [`query::Repository`].

pub mod collation;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod models;
pub mod query;
