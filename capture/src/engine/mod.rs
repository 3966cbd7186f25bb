pub mod buffer;
pub mod observer;
pub mod session;
pub mod state;
