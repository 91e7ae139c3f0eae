//! Firmware image formats
//!
//! Upload text is reassembled into lines by [`stream::ImageParser`] and
//! decoded as Intel HEX ([`hex`]) or C-style hex literals ([`literal`]).
//! Decoded bytes are coalesced into consecutive-address runs by
//! [`batch::BatchAccumulator`] before they reach the programmer.
//! Binary images bypass this module entirely.

pub mod batch;
pub mod hex;
pub mod literal;
pub mod stream;

pub use batch::{BatchAccumulator, BatchSink};
pub use hex::ChecksumPolicy;
pub use stream::{ImageParser, ParseStats};
