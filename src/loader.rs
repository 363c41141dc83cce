//! Background sample loading
//!
//! Fetch and decode run on worker threads so the control thread never
//! blocks; completed loads are delivered over a channel and applied in
//! arrival order by `MixerEngine::tick`. A request carries its reserved
//! track id, so a track removed mid-load can be detected and the stale
//! result discarded.

use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::fetch::{self, FetchError};
use crate::sample::{self, DecodeError, SampleBuffer};
use crate::track::TrackId;

/// Where a track's bytes come from.
pub enum LoadSource {
    /// Fetch over HTTP(S).
    Url(String),
    /// Bytes already in memory (user file picked in the UI).
    Bytes(Vec<u8>),
}

/// A load request for a reserved track id.
pub struct LoadRequest {
    pub id: TrackId,
    pub name: String,
    pub color: String,
    pub source: LoadSource,
}

/// Why a load failed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A finished load, successful or not.
pub struct LoadOutcome {
    pub id: TrackId,
    pub name: String,
    pub color: String,
    pub result: Result<SampleBuffer, LoadError>,
}

/// Spawns one worker thread per request and collects completions.
pub struct SampleLoader {
    completions_tx: Sender<LoadOutcome>,
    completions_rx: Receiver<LoadOutcome>,
}

impl SampleLoader {
    pub fn new() -> Self {
        let (completions_tx, completions_rx) = unbounded();
        Self {
            completions_tx,
            completions_rx,
        }
    }

    /// Hand a request to a worker; its outcome arrives via [`Self::completions`].
    pub fn submit(&self, request: LoadRequest) {
        let tx = self.completions_tx.clone();
        thread::spawn(move || {
            let LoadRequest {
                id,
                name,
                color,
                source,
            } = request;
            let result = load(source);
            // The engine may be gone by the time a slow load finishes
            let _ = tx.send(LoadOutcome {
                id,
                name,
                color,
                result,
            });
        });
    }

    /// Drain the completions that have arrived so far, in arrival order.
    pub fn completions(&self) -> impl Iterator<Item = LoadOutcome> + '_ {
        self.completions_rx.try_iter()
    }
}

impl Default for SampleLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn load(source: LoadSource) -> Result<SampleBuffer, LoadError> {
    let bytes = match source {
        LoadSource::Url(url) => fetch::fetch_bytes(&url)?,
        LoadSource::Bytes(bytes) => bytes,
    };
    Ok(sample::decode_bytes(bytes)?)
}
