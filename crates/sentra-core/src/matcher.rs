//! Trigger matching between security events and playbooks.
//!
//! Matching is a pure function over well-formed playbooks; malformed
//! playbooks are rejected at store write time, never here.

use crate::event::SecurityEvent;
use crate::playbook::Playbook;

/// Returns the playbooks that match the event, ordered by
/// `(priority desc, playbook_id asc)`.
///
/// A playbook matches iff it is active, the event severity is in its
/// severity mapping, and the event type is in its trigger conditions.
/// Deterministic: identical inputs yield identical ordered results.
pub fn match_event<'a>(event: &SecurityEvent, playbooks: &'a [Playbook]) -> Vec<&'a Playbook> {
    let mut matched: Vec<&Playbook> = playbooks
        .iter()
        .filter(|p| {
            p.active
                && p.severity_mapping.contains(&event.severity)
                && p.trigger_conditions.contains(&event.event_type)
        })
        .collect();

    matched.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;
    use crate::playbook::{ActionType, PlaybookStep};

    fn playbook(name: &str, trigger: &str, severity: Severity) -> Playbook {
        Playbook::new(name, "test")
            .with_trigger(trigger)
            .with_severity(severity)
            .with_step(PlaybookStep::new(1, ActionType::NotifyTeam))
    }

    #[test]
    fn test_match_on_type_and_severity() {
        let event = SecurityEvent::new("ransomware_detected", Severity::Critical);
        let books = vec![
            playbook("ransomware", "ransomware_detected", Severity::Critical),
            playbook("phishing", "phishing_reported", Severity::Critical),
            playbook("ransomware-high", "ransomware_detected", Severity::High),
        ];

        let matched = match_event(&event, &books);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "ransomware");
    }

    #[test]
    fn test_inactive_playbook_never_matches() {
        let event = SecurityEvent::new("malware_detected", Severity::High);
        let books = vec![
            playbook("active", "malware_detected", Severity::High),
            playbook("inactive", "malware_detected", Severity::High).with_active(false),
        ];

        let matched = match_event(&event, &books);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "active");
    }

    #[test]
    fn test_priority_ordering_with_id_tiebreak() {
        let event = SecurityEvent::new("malware_detected", Severity::High);
        let low = playbook("low", "malware_detected", Severity::High).with_priority(1);
        let high = playbook("high", "malware_detected", Severity::High).with_priority(10);
        let tied_a = playbook("tied-a", "malware_detected", Severity::High).with_priority(5);
        let tied_b = playbook("tied-b", "malware_detected", Severity::High).with_priority(5);

        let books = vec![low, tied_b.clone(), high, tied_a.clone()];
        let matched = match_event(&event, &books);

        assert_eq!(matched[0].name, "high");
        assert_eq!(matched[3].name, "low");
        // Equal priority falls back to ascending id
        let expected_tied_first = if tied_a.id < tied_b.id { "tied-a" } else { "tied-b" };
        assert_eq!(matched[1].name, expected_tied_first);
    }

    #[test]
    fn test_match_is_deterministic() {
        let event = SecurityEvent::new("malware_detected", Severity::High);
        let books: Vec<Playbook> = (0..8)
            .map(|i| {
                playbook(&format!("pb-{i}"), "malware_detected", Severity::High)
                    .with_priority(i % 3)
            })
            .collect();

        let first: Vec<_> = match_event(&event, &books).iter().map(|p| p.id).collect();
        for _ in 0..10 {
            let again: Vec<_> = match_event(&event, &books).iter().map(|p| p.id).collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_no_match_returns_empty() {
        let event = SecurityEvent::new("unknown_event", Severity::Low);
        let books = vec![playbook("pb", "malware_detected", Severity::High)];
        assert!(match_event(&event, &books).is_empty());
    }
}
