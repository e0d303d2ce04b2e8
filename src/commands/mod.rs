// Command handlers module
pub mod config;
pub mod cpu;
pub mod gpu;
pub mod topology;
pub mod watch;

// Re-exports for cleaner imports
pub use cpu::execute as cpu;
pub use gpu::execute as gpu;
pub use topology::execute as topology;
pub use watch::execute as watch;
