// Detection module - sustained chime recognition
//
// FrequencyAnalyzer output (per-tone energies) is turned into discrete
// detection events by `DetectionStateMachine`; `DetectionLoop` runs the whole
// pipeline on a dedicated thread.

pub mod quiet;
pub mod state_machine;
pub mod worker;

pub use quiet::QuietWindow;
pub use state_machine::{
    DetectionConfig, DetectionEvent, DetectionSnapshot, DetectionState, DetectionStateMachine,
    EnergyThreshold, MatchPolicy, Tick,
};
pub use worker::{
    unlock_url, DetectionLoop, DetectionLoopHandle, LoopSettings, LoopStatus, StatusProbe,
};
