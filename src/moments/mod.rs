mod covariance;
mod mean;
mod sparse_sum;
mod sum;
mod variance;

pub use covariance::Covariance;
pub use mean::Mean;
pub use sparse_sum::SparseSum;
pub use sum::Sum;
pub use variance::Variance;
