pub mod pipeline;

pub use pipeline::ClassifyTranslatePipeline;
