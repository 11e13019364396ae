pub mod checkpoint;
pub mod loader;

pub use checkpoint::{find_checkpoint, list_checkpoints};
pub use loader::{inspect, load, prepare_args, CheckpointSummary, LoadedGenerator};
