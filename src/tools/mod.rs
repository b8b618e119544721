//! Tool contracts, registry, and preload cache.

pub mod preload;
pub mod registry;
pub mod tool;

pub use preload::ToolPreloadCache;
pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool, ToolDescriptor};
