//! Domain types shared across the scheduler and its consumers

mod priority;

pub use priority::Priority;
