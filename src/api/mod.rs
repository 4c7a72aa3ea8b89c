//! Compute API interaction module
//!
//! Core plumbing for talking to the provider's REST surface: the HTTP
//! wrapper and the URL-building client.
//!
//! # Module Structure
//!
//! - [`client`] - Main client for making API requests
//! - [`http`] - HTTP utilities, auth header handling, error mapping

pub mod client;
pub mod http;
