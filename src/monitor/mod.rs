//! Sliding-window health classification.
//!
//! Each monitored target owns a fixed-capacity ring buffer of recent up/down
//! samples. A round pushes one sample, smooths the window into a ratio, maps
//! the ratio through a threshold table, and reports the target only when the
//! resulting state differs from the last one reported. That hysteresis is
//! what keeps a flapping target from spamming notifications.

pub mod weather;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::config::ServersConfig;
use crate::probe::Prober;
use crate::scheduler::Job;

/// Discrete health classification of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    Up,
    Down,
    /// Label from a threshold table, for ratios strictly between 0 and 1.
    Degraded(String),
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Up => f.write_str("UP"),
            HealthState::Down => f.write_str("DOWN"),
            HealthState::Degraded(label) => f.write_str(label),
        }
    }
}

/// Fixed-capacity ring buffer of boolean liveness samples.
#[derive(Debug)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<u8>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a sample, evicting the oldest once full.
    pub fn push(&mut self, alive: bool) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(alive as u8);
    }

    /// Mean of the recorded samples; `None` while the window is empty.
    pub fn ratio(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u32 = self.samples.iter().map(|&s| s as u32).sum();
        Some(sum as f64 / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Ordered ratio-to-label mapping, supplied per classification call so the
/// same window data can be bucketed differently by different callers.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    /// `(minimum ratio, label)`, sorted by ratio descending.
    entries: Vec<(f64, String)>,
    class1: HealthState,
    class0: HealthState,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            class1: HealthState::Up,
            class0: HealthState::Down,
        }
    }
}

impl ThresholdTable {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (f64, S)>,
        S: Into<String>,
    {
        let mut entries: Vec<(f64, String)> = entries
            .into_iter()
            .map(|(ratio, label)| (ratio, label.into()))
            .collect();
        entries.sort_by(|a, b| b.0.total_cmp(&a.0));
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Override the boundary states reported for ratios of exactly 1.0 / 0.0.
    pub fn with_classes(mut self, class1: HealthState, class0: HealthState) -> Self {
        self.class1 = class1;
        self.class0 = class0;
        self
    }

    /// Bucket a smoothed ratio. Exactly 1.0 and 0.0 always map to the
    /// boundary states regardless of the entries; anything in between picks
    /// the first entry whose minimum is `<=` the ratio (inclusive at ties).
    /// `None` when no entry covers the ratio.
    pub fn classify(&self, ratio: f64) -> Option<HealthState> {
        if ratio == 1.0 {
            return Some(self.class1.clone());
        }
        if ratio == 0.0 {
            return Some(self.class0.clone());
        }
        self.entries
            .iter()
            .find(|(minimum, _)| ratio >= *minimum)
            .map(|(_, label)| HealthState::Degraded(label.clone()))
    }
}

/// One monitored endpoint: its prober, window, and last-reported state.
#[derive(Debug)]
struct MonitoredTarget {
    prober: Prober,
    window: SampleWindow,
    last_state: Option<HealthState>,
}

impl MonitoredTarget {
    /// Feed one sample and return the new state only when it differs from
    /// the previously reported one. The first computed state always counts
    /// as a change.
    fn observe(&mut self, alive: bool, table: &ThresholdTable) -> Option<HealthState> {
        self.window.push(alive);
        let ratio = self.window.ratio()?;
        let state = table.classify(ratio)?;
        if self.last_state.as_ref() == Some(&state) {
            return None;
        }
        self.last_state = Some(state.clone());
        Some(state)
    }
}

/// The set of monitored targets driven by one scheduled job.
#[derive(Debug)]
pub struct ServerMonitor {
    targets: Vec<MonitoredTarget>,
}

impl ServerMonitor {
    /// One target per configured server, windows sized by
    /// `previous_data_points`.
    pub fn from_config(config: &ServersConfig) -> Self {
        let targets = config
            .ping_servers
            .iter()
            .map(|(name, entry)| MonitoredTarget {
                prober: Prober::build(name, entry.kind),
                window: SampleWindow::new(config.previous_data_points),
                last_state: None,
            })
            .collect();
        Self { targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Raw liveness snapshot of every target, no history involved.
    pub async fn get_status(&self) -> BTreeMap<String, bool> {
        let mut status = BTreeMap::new();
        for target in &self.targets {
            let (alive, _detail) = target.prober.is_alive().await;
            status.insert(target.prober.target().to_string(), alive);
        }
        status
    }

    /// Probe every target once and return only the targets whose smoothed
    /// state changed since the last report.
    pub async fn check_transitions(
        &mut self,
        table: &ThresholdTable,
    ) -> BTreeMap<String, HealthState> {
        let mut changed = BTreeMap::new();
        for target in &mut self.targets {
            let (alive, detail) = target.prober.is_alive().await;
            tracing::debug!("{}: {}, {}", target.prober.target(), alive, detail);
            if let Some(state) = target.observe(alive, table) {
                changed.insert(target.prober.target().to_string(), state);
            }
        }
        changed
    }
}

/// Render a round's transitions as notification text, one line per target.
fn format_transitions(changed: &BTreeMap<String, HealthState>) -> Option<String> {
    if changed.is_empty() {
        return None;
    }
    let mut message = String::new();
    for (name, state) in changed {
        message.push_str(&format!("{} is {}\n", name, state));
    }
    Some(message)
}

impl Job for ServerMonitor {
    async fn run(&mut self) -> Option<String> {
        let table = ThresholdTable::default();
        let changed = self.check_transitions(&table).await;
        format_transitions(&changed)
    }
}
