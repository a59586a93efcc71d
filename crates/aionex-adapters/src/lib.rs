//! Runtime adapters for aionex (GitHub store, demo store, config/auth).

pub mod config;
pub mod demo;
pub mod github;
pub mod keyring;
