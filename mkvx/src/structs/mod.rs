//! Data structures representing container and stream components.
//!
//! Contains the element, track, frame and timecode representations used
//! throughout the demultiplexing pipeline, plus the sync state and the
//! diagnostic records produced while recovering from corruption.

pub mod diagnostic;
pub mod element;
pub mod frame;
pub mod sync;
pub mod timecode;
pub mod track;
