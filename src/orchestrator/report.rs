//! Per-node diagnostic reports.

use crate::artifact::UniqueArtifact;
use crate::types::ExtensionId;
use std::collections::BTreeMap;
use std::fmt;

/// Diagnostic messages of one phase, keyed by node. Each node is written only by its own task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    entries: BTreeMap<ExtensionId, Vec<String>>,
}

impl BootReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: ExtensionId, message: impl Into<String>) {
        self.entries.entry(id).or_default().push(message.into());
    }

    pub fn messages(&self, id: &ExtensionId) -> &[String] {
        self.entries.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &ExtensionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of nodes with at least one message.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExtensionId, &Vec<String>)> {
        self.entries.iter()
    }

    pub fn merge(&mut self, other: BootReport) {
        for (id, messages) in other.entries {
            self.entries.entry(id).or_default().extend(messages);
        }
    }
}

impl fmt::Display for BootReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, messages) in &self.entries {
            writeln!(f, "  {}:", id)?;
            for message in messages {
                writeln!(f, "    - {}", message)?;
            }
        }
        Ok(())
    }
}

/// Result of a load phase whose root loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub report: BootReport,
    /// Artifact each loaded node was materialised from.
    pub resolved: BTreeMap<ExtensionId, UniqueArtifact>,
    pub loaded: usize,
    pub failed: usize,
}

/// Result of a successful launch phase.
#[derive(Debug, Clone, Default)]
pub struct LaunchOutcome {
    pub running: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_accumulates_per_node() {
        let a = ExtensionId::new();
        let b = ExtensionId::new();
        let mut report = BootReport::new();
        report.record(a, "first");
        report.record(a, "second");

        let mut other = BootReport::new();
        other.record(b, "elsewhere");
        report.merge(other);

        assert_eq!(report.messages(&a), ["first", "second"]);
        assert_eq!(report.len(), 2);
        assert!(report.messages(&ExtensionId::new()).is_empty());
        let rendered = report.to_string();
        assert!(rendered.contains("- second"));
        assert!(rendered.contains(&b.to_string()));
    }
}
