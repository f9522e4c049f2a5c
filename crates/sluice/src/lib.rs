// sluice: a concurrency toolkit of three layers — chainable promises, managed
// executor services, and a flood-testing engine for exercising resources
// under concurrent load.

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod floodgate;
pub mod marshal;
pub mod per_task_executor;
pub mod pool_executor;
pub mod promise;
pub mod target;
pub mod torrent;

pub use action::{CompletionHandler, PrimaryAction, TaskAction, TransmuteAction};
pub use config::Configuration;
pub use error::{BoxCause, Cause, CoreError};
pub use event::{ActionKind, Event, Subscriber};
pub use executor::{ExecutorState, ManagedExecutor};
pub use floodgate::{FloodState, Floodgate, DEFAULT_GRACE_PERIOD};
pub use marshal::{Latch, Marshal};
pub use per_task_executor::PerTaskExecutor;
pub use pool_executor::PoolExecutor;
pub use promise::{Promise, PromiseState};
pub use target::{Stability, Target, TargetRegistry};
pub use torrent::{Torrent, TorrentBuilder};
