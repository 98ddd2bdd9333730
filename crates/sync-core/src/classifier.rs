//! Interaction Classifier (C8) — a stateless router. Given an operation's
//! declared `InteractionClass`, decides whether it travels through the
//! Realtime Channel (C7) or the durable Repository/Mutation
//! Log/Sync Engine path (C2→C3→C5), per the degradation matrix in §4.7.
//!
//! `sync-core` cannot depend on `realtime-channel` (the dependency runs
//! the other way), so the realtime side of the boundary is an injected
//! trait object rather than a concrete type.

use crate::error::{Result, SyncCoreError};
use crate::types::InteractionClass;

/// What the Realtime Channel looks like from the classifier's point of
/// view: "is it healthy right now" and "hand it this payload".
pub trait RealtimeSink: Send + Sync {
    fn is_connected(&self) -> bool;
    fn send_realtime(&self, class: InteractionClass, payload: &serde_json::Value) -> Result<()>;
}

/// What the durable path looks like: append-and-let-C5-drain-it-later.
pub trait DurablePath: Send + Sync {
    fn enqueue_durable(&self, class: InteractionClass, payload: &serde_json::Value) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutedVia {
    Realtime,
    Durable,
    Dropped,
}

pub struct InteractionClassifier;

impl InteractionClassifier {
    /// Route `payload` declared as `class` to the correct path.
    /// Class D is refused by the realtime sink regardless of caller
    /// (Testable Property 7) — the classifier additionally never offers
    /// it one.
    pub fn route(
        class: InteractionClass,
        payload: &serde_json::Value,
        realtime: Option<&dyn RealtimeSink>,
        durable: &dyn DurablePath,
    ) -> Result<RoutedVia> {
        match class {
            InteractionClass::D => {
                durable.enqueue_durable(class, payload)?;
                Ok(RoutedVia::Durable)
            }
            InteractionClass::A => match realtime {
                Some(rt) if rt.is_connected() => {
                    rt.send_realtime(class, payload)?;
                    Ok(RoutedVia::Realtime)
                }
                _ => Ok(RoutedVia::Dropped),
            },
            InteractionClass::B => match realtime {
                Some(rt) if rt.is_connected() => {
                    rt.send_realtime(class, payload)?;
                    Ok(RoutedVia::Realtime)
                }
                _ => {
                    durable.enqueue_durable(class, payload)?;
                    Ok(RoutedVia::Durable)
                }
            },
            InteractionClass::C => match realtime {
                Some(rt) if rt.is_connected() => {
                    rt.send_realtime(class, payload)?;
                    Ok(RoutedVia::Realtime)
                }
                _ => {
                    durable.enqueue_durable(class, payload)?;
                    Ok(RoutedVia::Durable)
                }
            },
        }
    }

    /// Refuses any attempt to route a Class-D operation via realtime,
    /// independent of `route()` — a direct call-site guard for code paths
    /// that hold a realtime sink and are tempted to use it directly.
    pub fn refuse_class_d_on_realtime(class: InteractionClass) -> Result<()> {
        if class == InteractionClass::D {
            return Err(SyncCoreError::Validation(
                "class D operations must never use the realtime channel".to_string(),
            ));
        }
        Ok(())
    }
}
