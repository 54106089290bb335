pub mod index;
pub mod pipeline;

pub use pipeline::Pipeline;
