pub mod classifier;
pub mod histogram;
pub mod layout;
