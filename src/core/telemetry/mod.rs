//! Hardware telemetry acquisition engine.

pub mod context;
pub mod cpu;
pub mod gpu;
pub mod history;
pub mod registers;
pub mod sensor;
pub mod topology;
pub mod watchdog;

pub use context::{ContextSettings, TelemetryContext};
pub use cpu::{CpuDevice, CpuSnapshot, EngineSettings};
pub use gpu::layered::{GpuDevice, GpuSnapshot, Tier};
pub use gpu::session::SessionGpuSnapshot;
pub use history::{HistorySample, SnapshotHistory};
pub use registers::{GroupAffinity, PciAddress, RegisterAccess, RegisterDriver};
pub use sensor::{Sensor, SensorKind};
pub use topology::{LogicalProcessor, ProcessorProbe, Topology, TopologyResolver, Vendor};
pub use watchdog::{Verdict, WatchdogResetPolicy};
