//! Client side of the Mirage service.
//!
//! This crate provides:
//! - `MirageClient`, a reqwest client for the upload/playback/stats API
//! - Processing triggers: a simulated one that echoes its input after a
//!   delay, and a remote one that uploads to the service
//! - `CompareSession`, the original-vs-processed comparison state
//! - The `mirage` command-line tool

pub mod client;
pub mod error;
pub mod session;
pub mod trigger;

pub use client::{ClientConfig, MirageClient};
pub use error::{ClientError, ClientResult};
pub use session::{CompareSession, ProcessedVideo, SelectedVideo};
pub use trigger::{ProcessingOutcome, ProcessingTrigger, RemoteTrigger, SimulatedTrigger};
