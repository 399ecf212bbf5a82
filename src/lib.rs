pub mod config;
pub mod processing;
pub mod sim;
pub mod utils;

pub use config::{load_config, save_config, EngineConfig, SamplingConfig};
pub use processing::aggregator::DisplayFields;
pub use processing::detectors::PeakReport;
pub use processing::engine::{
    ConverterControl, DetectionEngine, EngineStats, ExportedSnapshot, SnapshotView,
};
