//! Typed record persistence on top of the encrypted store.

mod codec;
mod repository;

pub use codec::{JsonCodec, RecordCodec};
pub use repository::RecordRepository;
