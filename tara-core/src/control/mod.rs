// tara-core/src/control/mod.rs

pub mod display;
pub mod teleop_loop;
pub mod pairs;
pub mod record;
pub mod probe;

pub use teleop_loop::{teleop_loop, LoopOptions, LoopStats};
pub use pairs::{run_pairs, Pair};
pub use record::{record_loop, RecordOptions, RecordSummary};
pub use probe::{probe, ProbeOutcome, ProbeReport};
