mod online;
mod slotted;

pub use online::OnlineHistogram;
pub use slotted::SlottedHistogram;
