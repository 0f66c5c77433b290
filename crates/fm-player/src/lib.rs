//! Real-time playback pipeline for FM-synthesis music engines.
//!
//! A non-real-time producer ([`controller::RefillController`] pulling from a
//! [`source::SampleSource`]) feeds a hard-real-time consumer ([`render::RenderLoop`],
//! driven by the audio callback) through bounded, non-blocking channels.

pub mod chunk;
pub mod clock;
pub mod config;
pub mod controller;
pub mod device;
pub mod message;
pub mod pipeline;
pub mod playback;
pub mod player;
pub mod queue;
pub mod render;
pub mod source;
pub mod status;
pub mod transport;
