//! 核心底座：组件键、目录与查找、消息分发、生命周期、错误存储

pub mod dashboard;
pub mod directory;
pub mod error;
pub mod error_store;
pub mod handle;
pub mod host;
pub mod key;
pub mod lifecycle;
pub mod message;
#[cfg(test)]
pub(crate) mod testing;

pub use dashboard::{Dashboard, DashboardBuilder, DashboardSettings};
pub use directory::{Directory, DirectorySettings, DuplicatePolicy, LookupOptions, LookupOutcome, LookupReport};
pub use error::ComponentError;
pub use error_store::{ErrorRecord, ErrorStore};
pub use handle::{ComponentHandle, State};
pub use host::{ComponentHost, HostOptions, Widget};
pub use key::ComponentKey;
pub use lifecycle::Phase;
pub use message::{payload, Message, Payload, Repertoire, Response};
