//! Core domain types shared by both trading engines.

pub mod activity;
pub mod market;
pub mod order;

pub use activity::*;
pub use market::*;
pub use order::*;
