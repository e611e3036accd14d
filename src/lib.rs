pub mod clock;
pub mod codec;
pub mod commands;
pub mod config;
pub mod countdown;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod sanitize;
pub mod storage;
pub mod timeline;
pub mod undo;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dashboard::Dashboard;
pub use error::{DashboardError, ValidationError};
pub use gateway::Gateway;
pub use models::{Project, ProjectDraft, State, Task, Theme};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
