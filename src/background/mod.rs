pub mod countdown_ticker;
pub mod detection;
pub mod scheduler;
pub mod settings_sync;

pub use countdown_ticker::{CountdownTicker, start_countdown_ticker};
pub use detection::{DetectionControl, DetectionService, TickReport};
pub use scheduler::{CancelToken, ManualScheduler, Scheduler, TokioScheduler};
pub use settings_sync::SettingsSync;
