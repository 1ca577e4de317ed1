//! # Adapter Implementations
//!
//! Concrete implementations of the subsystems' outbound ports.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  OUTER LAYER (Adapters)                      │
//! │  HttpDispatchAdapter, NonRepudiationRecorder, storage, logs  │
//! └──────────────────────────────────────────────────────────────┘
//!                        ↑ implements ↑
//! ┌──────────────────────────────────────────────────────────────┐
//! │  DispatchAdapter, EnvelopeRecorder, KeyValueStore (ports)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod notifications;
pub mod recorder;
pub mod storage;

pub use http::HttpDispatchAdapter;
pub use notifications::spawn_notification_logger;
pub use recorder::NonRepudiationRecorder;
pub use storage::{available_disk_space_percent, open_stores, DynStore, GatewayStores};
