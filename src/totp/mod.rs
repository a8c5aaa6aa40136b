//! TOTP second factor.

pub mod base32;
mod engine;

pub use engine::{
    generate_secret, hotp, time_step, TotpEngine, CODE_DIGITS, DEFAULT_SKEW_STEPS, SECRET_BYTES,
    STEP_SECS,
};
