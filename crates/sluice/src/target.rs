//! Process-wide target registry: assigns unique, human-readable names to the
//! resources flood-tested by a [`crate::floodgate::Floodgate`], and tracks
//! their observed stability.
//!
//! A single process-wide mapping from type-key to counter, guarded by a
//! mutex (mirroring the pool dispatch queue's `Mutex<VecDeque<_>>` pattern in
//! this workspace's executor modules), rather than an actual ambient global —
//! callers go through [`TargetRegistry::global`] explicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Observed health of a [`Target`]. Starts [`Stability::Stable`]; a Floodgate
/// worker that catches a non-interruption error from the target's resource
/// may flip it to [`Stability::Unstable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Unstable,
}

/// A named unit under test, shared by every Floodgate that addresses it.
///
/// Cloning a `Target` is cheap (it's a name plus an `Arc<AtomicBool>`); all
/// clones observe the same stability flag.
#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    unstable: Arc<AtomicBool>,
}

impl Target {
    /// Registers a new target of the given type name, returning it with a
    /// freshly minted, registry-unique name.
    pub fn new(type_name: &str) -> Target {
        TargetRegistry::global().register(type_name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stability(&self) -> Stability {
        if self.unstable.load(Ordering::Acquire) {
            Stability::Unstable
        } else {
            Stability::Stable
        }
    }

    /// Marks the target unstable. Idempotent; never clears back to stable —
    /// per spec, stability is write-mostly and one-directional within a
    /// Floodgate's run.
    pub fn mark_unstable(&self) {
        self.unstable.store(true, Ordering::Release);
    }

    fn with_name(name: String) -> Target {
        Target { name, unstable: Arc::new(AtomicBool::new(false)) }
    }
}

/// The process-wide type-key → counter map backing [`Target::new`].
pub struct TargetRegistry {
    counters: Mutex<HashMap<String, u32>>,
}

impl TargetRegistry {
    fn new() -> TargetRegistry {
        TargetRegistry { counters: Mutex::new(HashMap::new()) }
    }

    /// Returns the process-global registry singleton.
    pub fn global() -> &'static TargetRegistry {
        static INSTANCE: OnceLock<TargetRegistry> = OnceLock::new();
        INSTANCE.get_or_init(TargetRegistry::new)
    }

    /// Atomically increments the counter for `type_name` and formats the
    /// resulting name as `{TypeName-NNN}`, zero-padded to three digits (wider
    /// once the counter exceeds 999).
    pub fn register(&self, type_name: &str) -> Target {
        let mut counters = self.counters.lock().expect("target registry poisoned");
        let counter = counters.entry(type_name.to_string()).or_insert(0);
        *counter += 1;
        let name = format!("{type_name}-{:03}", *counter);
        Target::with_name(name)
    }
}
