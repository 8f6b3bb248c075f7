pub mod roi;

pub use roi::RoiLine;
