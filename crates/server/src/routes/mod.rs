mod health;
mod pipelines;
mod steps;
pub mod sse;

pub use health::*;
pub use pipelines::*;
pub use steps::*;
