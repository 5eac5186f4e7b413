pub mod synthetic;

pub use synthetic::SyntheticHdrSource;
