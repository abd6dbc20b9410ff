pub mod pipeline;
pub mod renderer;

pub use pipeline::GpuPointInstance;
pub use renderer::PointRenderer;
