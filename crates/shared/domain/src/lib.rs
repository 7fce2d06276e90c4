//! # Domain Types
//!
//! This crate contains the pure data half of the substrate: the resolved
//! [`config::Settings`] model and the [`error`] taxonomy. Keep it lean:
//! no I/O, networking, or heavy logic—just data and simple helpers.

pub mod config;
pub mod error;
