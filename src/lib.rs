//! Daylog Guard - request security layer for the Daylog notes app
//!
//! This crate holds the per-request checks that sit in front of the note,
//! board and picture handlers: fixed-window rate limiting, double-submit
//! CSRF tokens and TOTP second-factor codes. The three parts are
//! independent; request-handling glue runs them in that order and maps a
//! rejection to 429, 403 or 401 respectively.

pub mod clock;
pub mod config;
pub mod csrf;
pub mod error;
pub mod ratelimit;
pub mod totp;
