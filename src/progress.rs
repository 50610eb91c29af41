//! Progress events emitted while packages are synced
//!
//! The executors never touch display state. They push [`SyncEvent`]s to a
//! [`ProgressSink`] and the front end decides how to show them.

use std::fmt;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStage {
    Preparing,
    Downloading,
    Extracting,
    Installing,
    Removing,
    UpToDate,
    Removed,
    Failed,
}

impl SyncStage {
    /// True for stages after which no further event follows for the package.
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStage::UpToDate | SyncStage::Removed | SyncStage::Failed)
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStage::Preparing => "Preparing",
            SyncStage::Downloading => "Downloading",
            SyncStage::Extracting => "Extracting",
            SyncStage::Installing => "Installing",
            SyncStage::Removing => "Removing",
            SyncStage::UpToDate => "Up to date",
            SyncStage::Removed => "Removed",
            SyncStage::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// One step of progress for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub package: String,
    pub stage: SyncStage,
    /// Download percentage; `None` when not applicable or unknown
    pub percent: Option<u8>,
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent {
            Some(p) => write!(f, "{}: {} {}%", self.package, self.stage, p),
            None => write!(f, "{}: {}", self.package, self.stage),
        }
    }
}

/// Subscriber for progress events
pub type ProgressSink = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// A sink that forwards every event into a channel, plus its receiving end.
pub fn channel() -> (ProgressSink, Receiver<SyncEvent>) {
    let (tx, rx) = mpsc::channel();
    let sink: ProgressSink = Arc::new(move |event: &SyncEvent| {
        let _ = tx.send(event.clone());
    });
    (sink, rx)
}

/// Optional sink with a convenient emit method.
#[derive(Clone, Default)]
pub struct Progress {
    sink: Option<ProgressSink>,
}

impl Progress {
    pub fn new(sink: Option<ProgressSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, package: &str, stage: SyncStage, percent: Option<u8>) {
        if let Some(ref sink) = self.sink {
            sink(&SyncEvent {
                package: package.to_string(),
                stage,
                percent,
            });
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("subscribed", &self.sink.is_some())
            .finish()
    }
}

/// Turns byte counts into whole percentages, reporting only on change.
#[derive(Debug, Default)]
pub struct PercentTracker {
    last: Option<u8>,
}

impl PercentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The new percentage if it moved by at least one point, else `None`.
    ///
    /// Always `None` without a known, non-zero total.
    pub fn update(&mut self, downloaded: u64, total: Option<u64>) -> Option<u8> {
        let total = total.filter(|t| *t > 0)?;
        let percent = (downloaded.saturating_mul(100) / total).min(100) as u8;

        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}
