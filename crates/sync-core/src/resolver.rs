//! Conflict Resolver (C6) — a closed set of named strategies, selected by
//! name rather than by subclass hierarchy (per the explicit design note
//! in spec.md §9). Every strategy is pure with respect to its inputs plus
//! clock-derived fields; none perform I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::ids::{ClientId, RecordId};

/// One side of a conflicting pair, plus the context needed for
/// deterministic tie-breaking and field-level merge.
#[derive(Debug, Clone)]
pub struct ConflictSide {
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
    pub client_id: ClientId,
    /// Per-field last-touched timestamps, used by `field-merge`. Absent
    /// fields defer to the other side.
    pub field_timestamps: Option<Map<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct ConflictInput {
    pub record_id: RecordId,
    pub local: ConflictSide,
    pub incoming: ConflictSide,
}

/// A resolver never returns partial state — the result is a complete
/// record payload ready to be written.
#[derive(Debug, Clone)]
pub struct ResolvedPayload {
    pub payload: Value,
    /// `true` if the resolution kept the local side's pending mutation
    /// untouched (no remote content was adopted); `false` if the
    /// resolution adopted remote content (remote win or merge) and the
    /// local mutation it subsumes should be dropped.
    pub kept_local_mutation: bool,
}

/// An operational-merge function: pure, commutative on concurrent
/// inputs, and the identity on equal inputs. The engine invokes it by
/// name, never by trait-object dispatch on arbitrary types.
pub type MergeFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub enum ResolverStrategy {
    LastWriteWins,
    FirstWriteWins,
    FieldMerge,
    OperationalMerge(MergeFn),
    Manual,
}

impl std::fmt::Debug for ResolverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverStrategy::LastWriteWins => write!(f, "LastWriteWins"),
            ResolverStrategy::FirstWriteWins => write!(f, "FirstWriteWins"),
            ResolverStrategy::FieldMerge => write!(f, "FieldMerge"),
            ResolverStrategy::OperationalMerge(_) => write!(f, "OperationalMerge(..)"),
            ResolverStrategy::Manual => write!(f, "Manual"),
        }
    }
}

/// Outcome of invoking a resolver: either a complete resolved payload, or
/// a suspension that defers to the manual-resolution registry.
pub enum ResolveOutcome {
    Resolved(ResolvedPayload),
    Deferred,
}

pub fn resolve(strategy: &ResolverStrategy, input: &ConflictInput) -> ResolveOutcome {
    match strategy {
        ResolverStrategy::LastWriteWins => ResolveOutcome::Resolved(last_write_wins(input)),
        ResolverStrategy::FirstWriteWins => ResolveOutcome::Resolved(first_write_wins(input)),
        ResolverStrategy::FieldMerge => ResolveOutcome::Resolved(field_merge(input)),
        ResolverStrategy::OperationalMerge(merge_fn) => {
            ResolveOutcome::Resolved(operational_merge(input, merge_fn))
        }
        ResolverStrategy::Manual => ResolveOutcome::Deferred,
    }
}

fn last_write_wins(input: &ConflictInput) -> ResolvedPayload {
    let local_wins = match input.local.updated_at.cmp(&input.incoming.updated_at) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        // Deterministic tie-break by clientId.
        std::cmp::Ordering::Equal => input.local.client_id <= input.incoming.client_id,
    };
    if local_wins {
        ResolvedPayload { payload: input.local.payload.clone(), kept_local_mutation: true }
    } else {
        ResolvedPayload { payload: input.incoming.payload.clone(), kept_local_mutation: false }
    }
}

fn first_write_wins(input: &ConflictInput) -> ResolvedPayload {
    let local_wins = match input.local.updated_at.cmp(&input.incoming.updated_at) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => input.local.client_id <= input.incoming.client_id,
    };
    if local_wins {
        ResolvedPayload { payload: input.local.payload.clone(), kept_local_mutation: true }
    } else {
        ResolvedPayload { payload: input.incoming.payload.clone(), kept_local_mutation: false }
    }
}

/// Union per-field, taking the later timestamp per field. Fields with no
/// recorded timestamp on either side defer to the incoming side's raw
/// value (treated as "undefined, defer to the other side").
fn field_merge(input: &ConflictInput) -> ResolvedPayload {
    let local_obj = input.local.payload.as_object().cloned().unwrap_or_default();
    let incoming_obj = input.incoming.payload.as_object().cloned().unwrap_or_default();
    let local_ts = input.local.field_timestamps.clone().unwrap_or_default();
    let incoming_ts = input.incoming.field_timestamps.clone().unwrap_or_default();

    let mut merged = Map::new();
    let mut any_local_field_kept = false;
    let mut fields: Vec<&String> = local_obj.keys().chain(incoming_obj.keys()).collect();
    fields.sort();
    fields.dedup();

    for field in fields {
        let local_val = local_obj.get(field);
        let incoming_val = incoming_obj.get(field);
        let local_field_ts = local_ts.get(field).and_then(|v| v.as_i64());
        let incoming_field_ts = incoming_ts.get(field).and_then(|v| v.as_i64());

        let chosen = match (local_val, incoming_val, local_field_ts, incoming_field_ts) {
            (Some(l), Some(r), Some(lt), Some(rt)) => {
                if lt >= rt {
                    any_local_field_kept = true;
                    l.clone()
                } else {
                    r.clone()
                }
            }
            // No per-field timestamp recorded on one side: the side with a
            // timestamp is "defined", the other defers to it.
            (Some(l), Some(_), Some(_), None) => {
                any_local_field_kept = true;
                l.clone()
            }
            (Some(_), Some(r), None, Some(_)) => r.clone(),
            (Some(l), None, _, _) => {
                any_local_field_kept = true;
                l.clone()
            }
            (None, Some(r), _, _) => r.clone(),
            // Neither side recorded a per-field timestamp: fall back to
            // the record-level winner (local), consistent with LWW.
            (Some(l), Some(_), None, None) => {
                any_local_field_kept = true;
                l.clone()
            }
            (None, None, _, _) => continue,
        };
        merged.insert(field.clone(), chosen);
    }

    ResolvedPayload { payload: Value::Object(merged), kept_local_mutation: any_local_field_kept }
}

fn operational_merge(input: &ConflictInput, merge_fn: &MergeFn) -> ResolvedPayload {
    if input.local.payload == input.incoming.payload {
        // Identity on equal inputs.
        return ResolvedPayload { payload: input.local.payload.clone(), kept_local_mutation: true };
    }
    let merged = merge_fn(&input.local.payload, &input.incoming.payload);
    ResolvedPayload { payload: merged, kept_local_mutation: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn side(payload: Value, updated_at_ms: i64, client: &str) -> ConflictSide {
        ConflictSide {
            payload,
            updated_at: Utc.timestamp_millis_opt(updated_at_ms).unwrap(),
            client_id: client.into(),
            field_timestamps: None,
        }
    }

    #[test]
    fn s2_lww_incoming_newer_wins() {
        let input = ConflictInput {
            record_id: "d2".into(),
            local: side(serde_json::json!({"title": "L"}), 1000, "client-a"),
            incoming: side(serde_json::json!({"title": "R"}), 2000, "client-b"),
        };
        let ResolveOutcome::Resolved(resolved) = resolve(&ResolverStrategy::LastWriteWins, &input) else {
            panic!("expected resolved")
        };
        assert_eq!(resolved.payload["title"], "R");
        assert!(!resolved.kept_local_mutation);
    }

    #[test]
    fn s3_lww_local_newer_wins_and_mutation_kept() {
        let input = ConflictInput {
            record_id: "d2".into(),
            local: side(serde_json::json!({"title": "L"}), 3000, "client-a"),
            incoming: side(serde_json::json!({"title": "R"}), 500, "client-b"),
        };
        let ResolveOutcome::Resolved(resolved) = resolve(&ResolverStrategy::LastWriteWins, &input) else {
            panic!("expected resolved")
        };
        assert_eq!(resolved.payload["title"], "L");
        assert!(resolved.kept_local_mutation);
    }

    #[test]
    fn s4_field_merge_takes_later_timestamp_per_field() {
        let mut local_ts = Map::new();
        local_ts.insert("a".into(), serde_json::json!(3000));
        local_ts.insert("b".into(), serde_json::json!(1000));
        let mut incoming_ts = Map::new();
        incoming_ts.insert("a".into(), serde_json::json!(1500));
        incoming_ts.insert("b".into(), serde_json::json!(2500));

        let input = ConflictInput {
            record_id: "d3".into(),
            local: ConflictSide {
                payload: serde_json::json!({"a": 1, "b": 2}),
                updated_at: Utc::now(),
                client_id: "client-a".into(),
                field_timestamps: Some(local_ts),
            },
            incoming: ConflictSide {
                payload: serde_json::json!({"a": 9, "b": 7}),
                updated_at: Utc::now(),
                client_id: "client-b".into(),
                field_timestamps: Some(incoming_ts),
            },
        };

        let ResolveOutcome::Resolved(resolved) = resolve(&ResolverStrategy::FieldMerge, &input) else {
            panic!("expected resolved")
        };
        assert_eq!(resolved.payload["a"], 1);
        assert_eq!(resolved.payload["b"], 7);
    }

    #[test]
    fn operational_merge_is_identity_on_equal_inputs() {
        let payload = serde_json::json!({"text": "same"});
        let input = ConflictInput {
            record_id: "d5".into(),
            local: side(payload.clone(), 1000, "client-a"),
            incoming: side(payload.clone(), 1000, "client-a"),
        };
        let merge_fn: MergeFn = Arc::new(|_, _| serde_json::json!({"text": "should not be used"}));
        let ResolveOutcome::Resolved(resolved) = resolve(&ResolverStrategy::OperationalMerge(merge_fn), &input) else {
            panic!("expected resolved")
        };
        assert_eq!(resolved.payload, payload);
    }

    #[test]
    fn manual_strategy_defers() {
        let input = ConflictInput {
            record_id: "d6".into(),
            local: side(serde_json::json!({}), 1000, "client-a"),
            incoming: side(serde_json::json!({}), 2000, "client-b"),
        };
        assert!(matches!(resolve(&ResolverStrategy::Manual, &input), ResolveOutcome::Deferred));
    }
}
