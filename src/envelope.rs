//! Recorded loudness history.
//!
//! `Envelope` is an append-only list of `(sample offset, value)` nodes at the
//! analyzer's period rate. `EnvelopeRecorder` wraps it for sharing between the
//! audio thread (one append per completed period) and the editor (full reads),
//! each holding the lock for a single operation. The audio side only ever
//! tries the lock and skips the node when the editor is reading.

use anyhow::{Context, Result};
use assert_no_alloc::permit_alloc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Nodes reserved when a recording starts; ten minutes at 100 periods per second.
pub const DEFAULT_RESERVED_NODES: usize = 60_000;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeNode {
    pub sample: u64,
    pub value: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Offset not strictly after the last stored node.
    NonMonotonicOffset { offset: u64, last: u64 },
    /// The editor held the envelope when the audio thread tried to append.
    Busy { offset: u64 },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::NonMonotonicOffset { offset, last } => write!(
                f,
                "envelope offset {offset} is not after the last stored offset {last}"
            ),
            EnvelopeError::Busy { offset } => {
                write!(f, "envelope locked, node at offset {offset} skipped")
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

#[derive(Clone, Debug, Default)]
pub struct Envelope {
    nodes: Vec<EnvelopeNode>,
    /// Nodes per second of audio.
    sample_rate: f32,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            sample_rate: 0.0,
        }
    }

    pub fn append(&mut self, sample: u64, value: f32) -> Result<(), EnvelopeError> {
        if let Some(last) = self.nodes.last() {
            if sample <= last.sample {
                return Err(EnvelopeError::NonMonotonicOffset {
                    offset: sample,
                    last: last.sample,
                });
            }
        }
        if self.nodes.len() == self.nodes.capacity() {
            // Amortized growth is the one allocation allowed on the audio thread
            permit_alloc(|| self.nodes.reserve(self.nodes.capacity().max(64)));
        }
        self.nodes.push(EnvelopeNode { sample, value });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that fit before the next growth.
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Drops every node and the recorded rate. Keeps the allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.sample_rate = 0.0;
    }

    pub fn nodes(&self) -> &[EnvelopeNode] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvelopeNode> {
        self.nodes.iter()
    }

    pub fn last(&self) -> Option<&EnvelopeNode> {
        self.nodes.last()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, rate: f32) {
        self.sample_rate = if rate.is_finite() { rate.max(0.0) } else { 0.0 };
    }

    /// Recorded length in seconds, `len / sample_rate`.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.nodes.len() as f64 / self.sample_rate as f64
    }

    /// Converts a node offset (audio samples) to seconds.
    pub fn offset_to_secs(offset: u64, audio_sample_rate: f32) -> f64 {
        if audio_sample_rate <= 0.0 {
            return 0.0;
        }
        offset as f64 / audio_sample_rate as f64
    }

    pub fn max_value(&self) -> f32 {
        self.nodes.iter().fold(0.0f32, |m, n| m.max(n.value))
    }

    pub fn snapshot(&self) -> EnvelopeSnapshot {
        EnvelopeSnapshot {
            sample_rate: self.sample_rate,
            nodes: self.nodes.clone(),
        }
    }

    /// Rebuilds an envelope, re-checking ordering node by node.
    pub fn from_snapshot(snapshot: &EnvelopeSnapshot) -> Result<Self> {
        let mut envelope = Envelope::with_capacity(snapshot.nodes.len());
        envelope.set_sample_rate(snapshot.sample_rate);
        for (i, node) in snapshot.nodes.iter().enumerate() {
            envelope
                .append(node.sample, node.value)
                .with_context(|| format!("invalid envelope node {i}"))?;
        }
        Ok(envelope)
    }
}

/// Serializable copy of a recorded envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSnapshot {
    pub sample_rate: f32,
    pub nodes: Vec<EnvelopeNode>,
}

impl EnvelopeSnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize envelope")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse envelope")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write envelope to {}", path.display()))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read envelope from {}", path.display()))?;
        Self::from_json(&json)
    }
}

/// Envelope plus the recording switch, shared through `Arc`.
#[derive(Default)]
pub struct EnvelopeRecorder {
    envelope: Mutex<Envelope>,
    recording: AtomicBool,
}

impl EnvelopeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the previous take and starts recording at `envelope_rate` nodes per second.
    ///
    /// Called from the editor or host side, never from the audio thread.
    pub fn start(&self, envelope_rate: f32) {
        // Allocate before locking; the lock only covers the swap
        let mut fresh = Envelope::with_capacity(DEFAULT_RESERVED_NODES);
        fresh.set_sample_rate(envelope_rate);
        let previous = std::mem::replace(&mut *self.lock(), fresh);
        drop(previous);
        self.recording.store(true, Ordering::Release);
        log::info!("envelope recording started at {envelope_rate:.2} nodes/s");
    }

    /// Stops appending. The envelope stays readable until the next `start`.
    pub fn stop(&self) {
        if self.recording.swap(false, Ordering::AcqRel) {
            log::info!("envelope recording stopped, {} nodes", self.len());
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Appends one node if recording. Returns the new length when a node was stored.
    ///
    /// Audio-thread side: never waits for the lock. A contended append is
    /// dropped and reported as `EnvelopeError::Busy`.
    pub fn record(&self, sample: u64, value: f32) -> Result<Option<usize>, EnvelopeError> {
        if !self.is_recording() {
            return Ok(None);
        }
        let mut envelope = match self.envelope.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(EnvelopeError::Busy { offset: sample }),
        };
        envelope.append(sample, value)?;
        Ok(Some(envelope.len()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` with the envelope locked for one read.
    pub fn read<R>(&self, f: impl FnOnce(&Envelope) -> R) -> R {
        f(&*self.lock())
    }

    pub fn snapshot(&self) -> EnvelopeSnapshot {
        self.read(Envelope::snapshot)
    }

    /// Writes the current take as JSON. Editor side.
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        snapshot.write_to(path)?;
        log::info!(
            "exported {} envelope nodes to {}",
            snapshot.nodes.len(),
            path.display()
        );
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Envelope> {
        // A panic while holding the lock leaves the node list intact; keep using it
        self.envelope
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
