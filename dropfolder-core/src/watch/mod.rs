//! Registry, notification and timers, driven by a single control task.

pub mod events;
pub mod notifier;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod watcher;

pub use events::{EventSender, WatchCommand, WatchEvent, WatchMessage, control_channel};
pub use notifier::{ChangeNotifier, NotifyNotifier, RecordingNotifier, SubscriptionHandle};
pub use registry::{DirectoryWatch, WatchRegistry, canonical_path};
pub use scheduler::{PollScheduler, TimerHandle};
pub use service::WatchService;
pub use watcher::{Collaborators, DropFolderWatcher};
