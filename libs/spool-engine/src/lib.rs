pub mod backends;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod plugin_host;
pub mod reader;
pub mod registry;
pub mod split;
pub mod summary;
pub mod writer;

pub use backends::BackendRegistry;
pub use error::EngineError;
pub use reader::SequentialReader;
pub use registry::TopicRegistry;
pub use split::{SplitEvent, SplitPolicy};
pub use summary::ContainerSummary;
pub use writer::SequentialWriter;
