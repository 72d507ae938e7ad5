// Basic types used throughout hoptrace
pub mod types;

// Transfer source trait with in-memory and polars-backed connectors
pub mod data_sources;
// Finding sink trait with collecting, JSON-lines, and text-log sinks
pub mod sinks;
// The depth-bounded, cycle-safe, threshold-filtered hop tracer
pub mod tracer;

// Denylist screening through an injected address classifier
pub mod classifier;
// Types and functions for summarizing the findings of a trace
pub mod summary;
