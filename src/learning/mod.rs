mod neural_net;
mod rec_lin_reg;

pub use neural_net::{NeuralNet, TransferFunction};
pub use rec_lin_reg::RecLinReg;
