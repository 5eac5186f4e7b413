pub mod block;
pub mod worker;

pub use block::{ProcessingBlock, SharedBlock};
pub use worker::spawn_worker;
