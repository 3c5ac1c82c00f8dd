pub mod registry;
pub mod run_log;

pub use registry::KeywordRegistry;
pub use run_log::RunLog;
