//! Jimeng Gateway
//!
//! OpenAI-compatible HTTP gateway over the Jimeng / Dreamina generation API.
//! Image and video jobs are submitted to the vendor, then polled with an
//! adaptive state machine until they succeed, fail, settle or time out.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
