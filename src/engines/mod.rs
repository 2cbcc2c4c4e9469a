//! Host speech engines.
//!
//! The crate core only talks to [`SpeechEngine`](crate::SpeechEngine); the
//! engines here bind it to a concrete synthesizer.
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `espeak` - espeak-ng command-line synthesizer (must be on PATH or configured)

#[cfg(feature = "espeak")]
pub mod espeak;
