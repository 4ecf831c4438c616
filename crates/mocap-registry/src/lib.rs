//! In-memory job registry for the mocap pipeline service.
//!
//! The registry owns all shared mutable state of the scheduling core: the
//! job map, the FIFO wait queue, the single current-job slot, and the
//! aggregate counters. Everything lives behind one lock and nothing is
//! persisted; a restart loses all history by design.

pub mod error;
pub mod progress;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use progress::{progress_channel, spawn_progress_forwarder, ProgressEvent, ProgressSender};
pub use registry::JobRegistry;
