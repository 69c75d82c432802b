use super::core::Analyzer;
use crate::pipeline::domain::AnalyzerType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity, rank and enable flag of a registered analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerDescriptor {
    pub analyzer_type: AnalyzerType,
    pub priority: u8,
    pub enabled: bool,
}

struct RegisteredAnalyzer {
    analyzer_type: AnalyzerType,
    priority: u8,
    enabled: AtomicBool,
    analyzer: Arc<dyn Analyzer>,
}

/// Active analyzer set in declaration order.
///
/// Priorities are fixed at registration; enable flags can be flipped while the
/// pipeline runs and are read once per selection.
pub struct AnalyzerRegistry {
    entries: Vec<RegisteredAnalyzer>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register with the type's default priority, enabled.
    pub fn register(self, analyzer: Box<dyn Analyzer>) -> Self {
        let priority = analyzer.analyzer_type().default_priority();
        self.register_with(analyzer, priority, true)
    }

    /// Register with an explicit priority and enable flag.
    ///
    /// A second analyzer for the same type replaces the first in place.
    pub fn register_with(
        mut self,
        analyzer: Box<dyn Analyzer>,
        priority: u8,
        enabled: bool,
    ) -> Self {
        let analyzer_type = analyzer.analyzer_type();
        let entry = RegisteredAnalyzer {
            analyzer_type,
            priority,
            enabled: AtomicBool::new(enabled),
            analyzer: Arc::from(analyzer),
        };

        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|e| e.analyzer_type == analyzer_type)
        {
            warn!("Replacing previously registered {} analyzer", analyzer_type);
            *slot = entry;
        } else {
            debug!(
                "Registered {} analyzer (priority {}, enabled {})",
                analyzer_type, priority, enabled
            );
            self.entries.push(entry);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptors(&self) -> Vec<AnalyzerDescriptor> {
        self.entries
            .iter()
            .map(|e| AnalyzerDescriptor {
                analyzer_type: e.analyzer_type,
                priority: e.priority,
                enabled: e.enabled.load(Ordering::Acquire),
            })
            .collect()
    }

    /// Returns false when no analyzer of that type is registered.
    pub fn set_enabled(&self, analyzer_type: AnalyzerType, enabled: bool) -> bool {
        match self.entries.iter().find(|e| e.analyzer_type == analyzer_type) {
            Some(entry) => {
                entry.enabled.store(enabled, Ordering::Release);
                debug!("{} analyzer enabled = {}", analyzer_type, enabled);
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, analyzer_type: AnalyzerType) -> bool {
        self.entries
            .iter()
            .find(|e| e.analyzer_type == analyzer_type)
            .is_some_and(|e| e.enabled.load(Ordering::Acquire))
    }

    /// Enabled analyzers, highest priority first, ties in declaration order, at most `budget`.
    pub fn select(&self, budget: usize) -> Vec<(AnalyzerType, Arc<dyn Analyzer>)> {
        let mut enabled: Vec<&RegisteredAnalyzer> = self
            .entries
            .iter()
            .filter(|e| e.enabled.load(Ordering::Acquire))
            .collect();
        // sort_by is stable, which keeps declaration order for equal priorities
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority));

        enabled
            .into_iter()
            .take(budget)
            .map(|e| (e.analyzer_type, Arc::clone(&e.analyzer)))
            .collect()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
