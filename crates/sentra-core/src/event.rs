//! Security event data model.
//!
//! Events are immutable facts produced by an external detection
//! collaborator. Runs reference events by id and never mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Severity of a security event or playbook mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Returns all severities in ascending order.
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable security event from the detection feed.
///
/// `affected_assets` is a sorted set; the engine relies on the sorted
/// iteration order when acquiring asset locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique identifier.
    pub id: Uuid,
    /// Event type tag, e.g. `ransomware_detected`.
    pub event_type: String,
    /// Severity assigned by the detection source.
    pub severity: Severity,
    /// When the event occurred at the source.
    pub occurred_at: DateTime<Utc>,
    /// Assets affected by this event.
    pub affected_assets: BTreeSet<String>,
    /// Additional detection context.
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    /// When the event record was created.
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    /// Creates a new event with the given type tag and severity.
    pub fn new(event_type: impl Into<String>, severity: Severity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            severity,
            occurred_at: now,
            affected_assets: BTreeSet::new(),
            details: HashMap::new(),
            created_at: now,
        }
    }

    /// Adds an affected asset.
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.affected_assets.insert(asset.into());
        self
    }

    /// Sets the affected asset set.
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a detail value.
    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// Sets the occurrence timestamp.
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// Filter criteria for listing events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by event type tag.
    pub event_type: Option<String>,
    /// Filter by exact severity.
    pub severity: Option<Severity>,
    /// Filter by minimum severity (inclusive).
    pub min_severity: Option<Severity>,
    /// Only events touching this asset.
    pub asset: Option<String>,
}

impl EventFilter {
    /// Returns true if the event passes the filter.
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(ref t) = self.event_type {
            if &event.event_type != t {
                return false;
            }
        }
        if let Some(s) = self.severity {
            if event.severity != s {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        if let Some(ref asset) = self.asset {
            if !event.affected_assets.contains(asset) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_roundtrip() {
        for severity in Severity::all() {
            let parsed = Severity::parse(severity.as_str()).unwrap();
            assert_eq!(&parsed, severity);
        }
        assert!(Severity::parse("bogus").is_none());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_event_builder() {
        let event = SecurityEvent::new("ransomware_detected", Severity::Critical)
            .with_asset("srv-db-01")
            .with_asset("ws-014")
            .with_detail("hash", serde_json::json!("abc123"));

        assert_eq!(event.event_type, "ransomware_detected");
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.affected_assets.len(), 2);
        // BTreeSet keeps assets sorted
        let assets: Vec<_> = event.affected_assets.iter().collect();
        assert_eq!(assets, vec!["srv-db-01", "ws-014"]);
    }

    #[test]
    fn test_event_filter() {
        let event = SecurityEvent::new("phishing_reported", Severity::Medium).with_asset("ws-001");

        let mut filter = EventFilter::default();
        assert!(filter.matches(&event));

        filter.event_type = Some("phishing_reported".to_string());
        assert!(filter.matches(&event));

        filter.min_severity = Some(Severity::High);
        assert!(!filter.matches(&event));

        filter.min_severity = Some(Severity::Low);
        filter.asset = Some("ws-002".to_string());
        assert!(!filter.matches(&event));
    }

    #[test]
    fn test_event_serialization() {
        let event = SecurityEvent::new("malware_detected", Severity::High).with_asset("ws-042");
        let json = serde_json::to_string(&event).unwrap();
        let back: SecurityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.severity, Severity::High);
        assert!(back.affected_assets.contains("ws-042"));
    }
}
