pub mod phase;
pub mod pipeline;
pub mod quality;
pub mod retry;
pub mod step;
pub mod verdict;
