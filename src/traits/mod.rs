mod persist;
pub use persist::{Persist, StateKind};

mod window_statistic;
pub use window_statistic::WindowStatistic;
