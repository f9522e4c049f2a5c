//! `Torrent<R>` — many floodgates released simultaneously through one
//! shared external marshal.
//!
//! The builder hands every contained [`crate::floodgate::Floodgate`] the
//! same [`crate::marshal::Marshal::External`] latch, so `Torrent::flood`'s
//! single `latch.release()` call is the one release edge every floodgate's
//! workers observe — the torrent itself never flips more than one latch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::error::CoreError;
use crate::floodgate::{FloodState, Floodgate};
use crate::marshal::{Latch, Marshal};

/// Accumulates floodgates sharing one external marshal, then produces a
/// [`Torrent`]. `threads`/`iterations` passed to [`TorrentBuilder::new`] are
/// the defaults [`TorrentBuilder::with_floodgate`] uses; per-floodgate
/// overrides go through [`TorrentBuilder::with_floodgate_sized`].
pub struct TorrentBuilder<R> {
    target_class_name: String,
    threads: usize,
    iterations: usize,
    shared_latch: Latch,
    floodgates: Vec<Floodgate<R>>,
}

impl<R> TorrentBuilder<R>
where
    R: Send + 'static,
{
    pub fn new(target_class_name: &str, threads: usize, iterations: usize) -> Result<TorrentBuilder<R>, CoreError> {
        if threads == 0 {
            return Err(CoreError::invalid_argument("torrent builder requires at least 1 worker thread"));
        }
        if iterations == 0 {
            return Err(CoreError::invalid_argument("torrent builder requires at least 1 iteration"));
        }
        Ok(TorrentBuilder {
            target_class_name: target_class_name.to_string(),
            threads,
            iterations,
            shared_latch: Latch::new(),
            floodgates: Vec::new(),
        })
    }

    /// Adds a floodgate sized to the builder's default `threads`/`iterations`.
    pub fn with_floodgate(mut self, resource: impl Fn() -> R + Send + Sync + 'static) -> Self {
        let gate = Floodgate::new(
            &self.target_class_name,
            self.threads,
            self.iterations,
            resource,
            Marshal::external(self.shared_latch.clone()),
        )
        .expect("builder-level threads/iterations were already validated in TorrentBuilder::new");
        self.floodgates.push(gate);
        self
    }

    /// Adds a floodgate with its own thread/iteration counts, independent of
    /// the builder's defaults.
    pub fn with_floodgate_sized(
        mut self,
        threads: usize,
        iterations: usize,
        resource: impl Fn() -> R + Send + Sync + 'static,
    ) -> Result<Self, CoreError> {
        let gate = Floodgate::new(
            &self.target_class_name,
            threads,
            iterations,
            resource,
            Marshal::external(self.shared_latch.clone()),
        )?;
        self.floodgates.push(gate);
        Ok(self)
    }

    /// Produces the torrent. An empty builder raises [`CoreError::InvalidArgument`].
    pub fn build(self) -> Result<Torrent<R>, CoreError> {
        if self.floodgates.is_empty() {
            return Err(CoreError::invalid_argument("torrent requires at least one floodgate"));
        }
        Ok(Torrent {
            floodgates: self.floodgates,
            state: AtomicU8::new(FloodState::Closed.as_u8()),
            shared_latch: self.shared_latch,
        })
    }
}

/// A set of floodgates sharing one externally-released marshal.
pub struct Torrent<R> {
    floodgates: Vec<Floodgate<R>>,
    state: AtomicU8,
    shared_latch: Latch,
}

impl<R> Torrent<R>
where
    R: Send + 'static,
{
    pub fn get_state(&self) -> FloodState {
        FloodState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Read-only view over the contained floodgates. There is no mutation
    /// API on a `&[Floodgate<R>]`, satisfying the "unmodifiable projection"
    /// requirement without a dedicated wrapper type.
    pub fn floodgates(&self) -> &[Floodgate<R>] {
        &self.floodgates
    }

    pub fn for_each(&self, mut consumer: impl FnMut(&Floodgate<R>)) {
        for gate in &self.floodgates {
            consumer(gate);
        }
    }

    /// Opens each contained floodgate in declaration order.
    pub fn open(&self) -> Result<(), CoreError> {
        let transitioned = self
            .state
            .compare_exchange(
                FloodState::Closed.as_u8(),
                FloodState::Opened.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            return Err(CoreError::invalid_state("torrent is not CLOSED"));
        }
        for gate in &self.floodgates {
            gate.open()?;
        }
        Ok(())
    }

    /// Spawns a collector that floods every contained floodgate in parallel,
    /// immediately releases the shared external marshal, and joins into a
    /// target-name-keyed result map. The outer call returns only after the
    /// collector completes; collector panics are caught and yield an empty map.
    pub fn flood(&self, timeout: Duration) -> Result<HashMap<String, Vec<Option<R>>>, CoreError>
    where
        R: Clone,
    {
        if self.get_state() != FloodState::Opened {
            return Err(CoreError::invalid_state("flood() requires an OPENED torrent"));
        }

        let floodgates = self.floodgates.clone();
        let latch = self.shared_latch.clone();

        let collector = std::thread::Builder::new()
            .name("torrent-collector".to_string())
            .spawn(move || {
                let worker_handles: Vec<_> = floodgates
                    .into_iter()
                    .map(|gate| {
                        std::thread::spawn(move || {
                            let name = gate.get_target().name().to_string();
                            let result = gate.flood(timeout).unwrap_or_default();
                            (name, result)
                        })
                    })
                    .collect();

                // Every inner flood() call is now blocked on this shared
                // latch (their marshal is External); release it once so
                // every floodgate's workers start off the same edge.
                latch.release();

                worker_handles.into_iter().filter_map(|handle| handle.join().ok()).collect::<Vec<_>>()
            })
            .expect("failed to spawn torrent collector thread");

        let collected: Vec<(String, Vec<Option<R>>)> = collector.join().unwrap_or_default();
        self.state.store(FloodState::Flooded.as_u8(), Ordering::Release);
        Ok(collected.into_iter().collect())
    }
}
