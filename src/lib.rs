#![doc = include_str!("../README.md")]
#![deny(
    unsafe_code,
    unused_imports,
    unused_variables,
    unused_must_use,
    missing_docs,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented
)]
#![allow(clippy::just_underscores_and_digits, clippy::len_without_is_empty)]

pub(crate) type Kbn<T> = compensated_summation::KahanBabuskaNeumaier<T>;

mod error;
pub use error::{StatsError, StatsResult};

mod utils;
pub use utils::SparseVector;
pub use utils::codec::{Decoder, Encoder, STATE_VERSION};

mod traits;
pub use traits::{Persist, StateKind, WindowStatistic};

pub mod config;

mod extremum;

mod minimum;
pub use minimum::Minimum;

mod maximum;
pub use maximum::Maximum;

mod moments;
pub use moments::{Covariance, Mean, SparseSum, Sum, Variance};

mod ema;
pub use ema::{Ema, EmaKind, SparseEma};

mod interpolator;
pub use interpolator::{Interpolator, InterpolatorKind};

mod histogram;
pub use histogram::{OnlineHistogram, SlottedHistogram};

mod tdigest;
pub use tdigest::TDigest;

mod chi_square;
pub use chi_square::ChiSquare;

mod learning;
pub use learning::{NeuralNet, RecLinReg, TransferFunction};
