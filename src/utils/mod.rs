pub mod codec;
pub mod helper;

mod monotonic_queue;
pub use monotonic_queue::{Max, Min, MonotonicQueue, OrderPolicy};

mod sparse;
pub use sparse::SparseVector;
