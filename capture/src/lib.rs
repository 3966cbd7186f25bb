//! Slide capture pipeline: samples frames, decides when on-screen content has
//! settled into a new slide, and exports the collected deck.

pub mod controller;
pub mod detect;
pub mod engine;
pub mod export;
pub mod source;
