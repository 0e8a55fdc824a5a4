//! Condition helpers
//!
//! Pure functions over `Vec<OperatorCondition>`. The one rule every helper
//! honours: `last_transition_time` moves only when `status` flips.

use crate::crd::{
    AuthenticationOperatorStatus, ConditionStatus, OperandVersion, OperatorCondition,
};
use crate::Error;

/// Condition type for the availability axis
pub const AVAILABLE: &str = "Available";

/// Condition type for the progressing axis
pub const PROGRESSING: &str = "Progressing";

/// Suffix shared by every degraded condition
pub const DEGRADED_SUFFIX: &str = "Degraded";

/// Reason used for healthy conditions
pub const REASON_AS_EXPECTED: &str = "AsExpected";

/// Reason used for a degraded condition raised without a specific reason
pub const REASON_ERROR: &str = "Error";

/// Insert or update a condition
///
/// The existing transition time is kept unless the status changes. Reason and
/// message are always overwritten.
pub fn set_condition(conditions: &mut Vec<OperatorCondition>, new: OperatorCondition) {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) => {
            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = new.last_transition_time;
            }
            existing.reason = new.reason;
            existing.message = new.message;
        }
        None => conditions.push(new),
    }
}

/// Find a condition by type
pub fn find_condition<'a>(
    conditions: &'a [OperatorCondition],
    type_: &str,
) -> Option<&'a OperatorCondition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Set or clear `<prefix>Degraded` from an optional error
pub fn handle_degraded(conditions: &mut Vec<OperatorCondition>, prefix: &str, err: Option<&Error>) {
    handle_degraded_with_reason(conditions, prefix, None, err);
}

/// Set or clear `<prefix>Degraded`, reporting `reason` when an error is present
pub fn handle_degraded_with_reason(
    conditions: &mut Vec<OperatorCondition>,
    prefix: &str,
    reason: Option<&str>,
    err: Option<&Error>,
) {
    let type_ = format!("{prefix}{DEGRADED_SUFFIX}");
    let condition = match err {
        Some(e) => OperatorCondition::new(
            type_,
            ConditionStatus::True,
            reason.unwrap_or(REASON_ERROR),
            e.to_string(),
        ),
        None => OperatorCondition::new(type_, ConditionStatus::False, REASON_AS_EXPECTED, ""),
    };
    set_condition(conditions, condition);
}

/// Progressing=True and Available=False with the same reason and message
pub fn set_progressing_true_and_available_false(
    conditions: &mut Vec<OperatorCondition>,
    reason: &str,
    message: &str,
) {
    set_progressing_true(conditions, reason, message);
    set_condition(
        conditions,
        OperatorCondition::new(AVAILABLE, ConditionStatus::False, reason, message),
    );
}

/// Progressing=True
pub fn set_progressing_true(conditions: &mut Vec<OperatorCondition>, reason: &str, message: &str) {
    set_condition(
        conditions,
        OperatorCondition::new(PROGRESSING, ConditionStatus::True, reason, message),
    );
}

/// Progressing=False, reason AsExpected
pub fn set_progressing_false(conditions: &mut Vec<OperatorCondition>) {
    set_condition(
        conditions,
        OperatorCondition::new(PROGRESSING, ConditionStatus::False, REASON_AS_EXPECTED, ""),
    );
}

/// Available=True
pub fn set_available_true(conditions: &mut Vec<OperatorCondition>, reason: &str) {
    set_condition(
        conditions,
        OperatorCondition::new(AVAILABLE, ConditionStatus::True, reason, ""),
    );
}

/// True if any `*Degraded` condition other than `<ignored_prefix>Degraded` is True
///
/// The aggregate `Degraded` condition is not a source and never counts.
pub fn is_degraded_ignoring(conditions: &[OperatorCondition], ignored_prefix: &str) -> bool {
    let ignored = format!("{ignored_prefix}{DEGRADED_SUFFIX}");
    conditions.iter().any(|c| {
        c.type_ != ignored
            && c.type_ != DEGRADED_SUFFIX
            && c.type_.ends_with(DEGRADED_SUFFIX)
            && c.is_true()
    })
}

/// Collapse every `*Degraded` condition into a single `Degraded` condition
///
/// The result is True when any source is True; its reason lists the degraded
/// sources and its message joins their messages, one per line.
pub fn aggregate_degraded(conditions: &[OperatorCondition]) -> OperatorCondition {
    let degraded: Vec<&OperatorCondition> = conditions
        .iter()
        .filter(|c| c.type_ != DEGRADED_SUFFIX && c.type_.ends_with(DEGRADED_SUFFIX))
        .filter(|c| c.is_true())
        .collect();

    if degraded.is_empty() {
        return OperatorCondition::new(
            DEGRADED_SUFFIX,
            ConditionStatus::False,
            REASON_AS_EXPECTED,
            "",
        );
    }

    let reason = degraded
        .iter()
        .map(|c| c.type_.as_str())
        .collect::<Vec<_>>()
        .join("::");
    let message = degraded
        .iter()
        .map(|c| format!("{}: {}", c.type_, c.message))
        .collect::<Vec<_>>()
        .join("\n");
    OperatorCondition::new(DEGRADED_SUFFIX, ConditionStatus::True, reason, message)
}

/// Merge the status computed this cycle over the status currently stored
///
/// Every non-condition field comes from `desired`. Conditions start from
/// `current` and each desired condition is applied with [`set_condition`],
/// so stored transition times survive unless the status actually flipped.
pub fn merge_status(
    current: &AuthenticationOperatorStatus,
    desired: &AuthenticationOperatorStatus,
) -> AuthenticationOperatorStatus {
    let mut conditions = current.conditions.clone();
    for condition in &desired.conditions {
        set_condition(&mut conditions, condition.clone());
    }
    let degraded = aggregate_degraded(&conditions);
    set_condition(&mut conditions, degraded);

    AuthenticationOperatorStatus {
        conditions,
        ..desired.clone()
    }
}

/// Record a component version, returning true if anything changed
pub fn set_version(versions: &mut Vec<OperandVersion>, name: &str, version: &str) -> bool {
    match versions.iter_mut().find(|v| v.name == name) {
        Some(existing) if existing.version == version => false,
        Some(existing) => {
            existing.version = version.to_string();
            true
        }
        None => {
            versions.push(OperandVersion {
                name: name.to_string(),
                version: version.to_string(),
            });
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn aged(type_: &str, status: ConditionStatus, hours: i64) -> OperatorCondition {
        let mut c = OperatorCondition::new(type_, status, "Old", "old message");
        c.last_transition_time = Utc::now() - Duration::hours(hours);
        c
    }

    // =========================================================================
    // Transition time discipline
    // =========================================================================

    /// Story: rewriting the same status keeps the transition time
    ///
    /// Reconciles run every minute. If every write bumped the transition time
    /// the condition would look like it flapped constantly.
    #[test]
    fn story_same_status_keeps_transition_time() {
        let mut conds = vec![aged(AVAILABLE, ConditionStatus::True, 5)];
        let before = conds[0].last_transition_time;

        set_available_true(&mut conds, REASON_AS_EXPECTED);

        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].last_transition_time, before);
        assert_eq!(conds[0].reason, REASON_AS_EXPECTED);
        assert_eq!(conds[0].message, "");
    }

    /// Story: flipping the status moves the transition time
    #[test]
    fn story_flipped_status_moves_transition_time() {
        let mut conds = vec![aged(AVAILABLE, ConditionStatus::True, 5)];
        let before = conds[0].last_transition_time;

        set_progressing_true_and_available_false(&mut conds, "RouteNotReady", "503");

        let available = find_condition(&conds, AVAILABLE).unwrap();
        assert_eq!(available.status, ConditionStatus::False);
        assert!(available.last_transition_time > before);

        let progressing = find_condition(&conds, PROGRESSING).unwrap();
        assert_eq!(progressing.status, ConditionStatus::True);
        assert_eq!(progressing.reason, "RouteNotReady");
    }

    // =========================================================================
    // Degraded handling
    // =========================================================================

    #[test]
    fn degraded_with_error_uses_reason_and_message() {
        let mut conds = Vec::new();
        let err = Error::probe("no route");
        handle_degraded_with_reason(&mut conds, "RouteStatus", Some("FailedHost"), Some(&err));

        let c = find_condition(&conds, "RouteStatusDegraded").unwrap();
        assert!(c.is_true());
        assert_eq!(c.reason, "FailedHost");
        assert_eq!(c.message, "no route");
    }

    #[test]
    fn degraded_without_reason_falls_back() {
        let mut conds = Vec::new();
        handle_degraded(&mut conds, "OAuthClients", Some(&Error::internal("x")));
        assert_eq!(conds[0].reason, REASON_ERROR);
    }

    #[test]
    fn clearing_degraded_empties_message() {
        let mut conds = vec![aged("RouteHealthDegraded", ConditionStatus::True, 1)];
        handle_degraded(&mut conds, "RouteHealth", None);
        assert_eq!(conds[0].status, ConditionStatus::False);
        assert_eq!(conds[0].reason, REASON_AS_EXPECTED);
        assert!(conds[0].message.is_empty());
    }

    /// Story: the catch-all degraded condition stays quiet behind a specific one
    #[test]
    fn story_catch_all_ignores_itself() {
        let conds = vec![
            aged("OperatorSyncDegraded", ConditionStatus::True, 1),
            aged("RouteStatusDegraded", ConditionStatus::False, 1),
        ];
        assert!(!is_degraded_ignoring(&conds, "OperatorSync"));

        let conds = vec![
            aged("OperatorSyncDegraded", ConditionStatus::False, 1),
            aged("RouteStatusDegraded", ConditionStatus::True, 1),
        ];
        assert!(is_degraded_ignoring(&conds, "OperatorSync"));
    }

    /// Story: the aggregate written by the previous cycle does not silence the catch-all
    #[test]
    fn story_aggregate_does_not_count_as_a_source() {
        let conds = vec![
            aged("OperatorSyncDegraded", ConditionStatus::True, 1),
            aged(DEGRADED_SUFFIX, ConditionStatus::True, 1),
            aged("RouteStatusDegraded", ConditionStatus::False, 1),
        ];
        assert!(!is_degraded_ignoring(&conds, "OperatorSync"));
    }

    #[test]
    fn aggregate_unions_sources() {
        let healthy = aggregate_degraded(&[aged("RouteStatusDegraded", ConditionStatus::False, 1)]);
        assert_eq!(healthy.status, ConditionStatus::False);

        let conds = vec![
            aged("RouteStatusDegraded", ConditionStatus::True, 1),
            aged("OAuthClientsDegraded", ConditionStatus::False, 1),
            aged("WellKnownEndpointDegraded", ConditionStatus::True, 1),
        ];
        let agg = aggregate_degraded(&conds);
        assert!(agg.is_true());
        assert_eq!(agg.reason, "RouteStatusDegraded::WellKnownEndpointDegraded");
        assert_eq!(agg.message.lines().count(), 2);
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Story: merging keeps stored transition times for unchanged statuses
    #[test]
    fn story_merge_preserves_stored_transition_times() {
        let stored = aged(PROGRESSING, ConditionStatus::False, 10);
        let stored_time = stored.last_transition_time;
        let current = AuthenticationOperatorStatus {
            observed_generation: 1,
            conditions: vec![stored, aged("Foreign", ConditionStatus::True, 3)],
            ..Default::default()
        };

        let mut desired = AuthenticationOperatorStatus {
            observed_generation: 2,
            ready_replicas: 2,
            ..Default::default()
        };
        set_progressing_false(&mut desired.conditions);
        set_available_true(&mut desired.conditions, REASON_AS_EXPECTED);

        let merged = merge_status(&current, &desired);

        assert_eq!(merged.observed_generation, 2);
        assert_eq!(merged.ready_replicas, 2);
        let progressing = find_condition(&merged.conditions, PROGRESSING).unwrap();
        assert_eq!(progressing.last_transition_time, stored_time);
        assert_eq!(progressing.reason, REASON_AS_EXPECTED);
        assert!(find_condition(&merged.conditions, "Foreign").is_some());
        assert!(find_condition(&merged.conditions, AVAILABLE).unwrap().is_true());
        assert_eq!(
            find_condition(&merged.conditions, DEGRADED_SUFFIX).unwrap().status,
            ConditionStatus::False
        );
    }

    #[test]
    fn set_version_reports_changes_only() {
        let mut versions = Vec::new();
        assert!(set_version(&mut versions, "operator", "4.16.0"));
        assert!(!set_version(&mut versions, "operator", "4.16.0"));
        assert!(set_version(&mut versions, "operator", "4.16.1"));
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "4.16.1");
    }
}
