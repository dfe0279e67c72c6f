//! # Stream Parsing
//!
//! Turns incrementally-delivered transport bytes into typed domain events:
//! the [`assembler`] recovers complete frames from arbitrary chunk
//! boundaries, the [`decoder`] maps frames and WebSocket envelopes onto the
//! closed [`DomainEvent`](decoder::DomainEvent) variant set.

pub mod assembler;
pub mod decoder;

pub use assembler::{Frame, FrameAssembler};
pub use decoder::{decode_envelope, decode_frame, DomainEvent};
