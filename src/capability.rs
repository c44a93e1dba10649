//! Capability registry.
//!
//! A [`CapabilitySet`] is what a provider hands the gateway: one optional
//! handler slot per named [`Capability`]. An empty slot is a legitimate state
//! and means the capability is withheld; the binder decides what that implies
//! for each route.

use std::collections::BTreeMap;
use std::fmt;

use crate::handler::{BoxedHandler, Handler};

/// Every handler slot the gateway knows how to bind.
///
/// The declaration order is the order routes are bound in, so the route
/// table does not depend on the order slots were filled.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Capability {
    FunctionLister,
    DeployFunction,
    DeleteFunction,
    UpdateFunction,
    FunctionStatus,
    ScaleFunction,
    Info,
    Secrets,
    Logs,
    ListNamespaces,
    MutateNamespace,
    FunctionProxy,
    Health,
    RegisterFunction,
    InvokeFunction,
    MetricFunction,
    ListCheckpoint,
    KillAllInstance,
}

impl Capability {
    pub const ALL: [Capability; 18] = [
        Self::FunctionLister,
        Self::DeployFunction,
        Self::DeleteFunction,
        Self::UpdateFunction,
        Self::FunctionStatus,
        Self::ScaleFunction,
        Self::Info,
        Self::Secrets,
        Self::Logs,
        Self::ListNamespaces,
        Self::MutateNamespace,
        Self::FunctionProxy,
        Self::Health,
        Self::RegisterFunction,
        Self::InvokeFunction,
        Self::MetricFunction,
        Self::ListCheckpoint,
        Self::KillAllInstance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FunctionLister   => "function-lister",
            Self::DeployFunction   => "deploy-function",
            Self::DeleteFunction   => "delete-function",
            Self::UpdateFunction   => "update-function",
            Self::FunctionStatus   => "function-status",
            Self::ScaleFunction    => "scale-function",
            Self::Info             => "info",
            Self::Secrets          => "secrets",
            Self::Logs             => "logs",
            Self::ListNamespaces   => "list-namespaces",
            Self::MutateNamespace  => "mutate-namespace",
            Self::FunctionProxy    => "function-proxy",
            Self::Health           => "health",
            Self::RegisterFunction => "register-function",
            Self::InvokeFunction   => "invoke-function",
            Self::MetricFunction   => "metric-function",
            Self::ListCheckpoint   => "list-checkpoint",
            Self::KillAllInstance  => "kill-all-instance",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The handlers a provider supplies, keyed by capability.
///
/// Each slot is either empty or holds exactly one handler. Filling a slot
/// twice replaces the earlier handler. The set is consumed by
/// [`Gateway::new`](crate::Gateway::new) and is immutable from then on.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    slots: BTreeMap<Capability, BoxedHandler>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills `capability` with `handler`. Returns `self` for chaining.
    pub fn with(mut self, capability: Capability, handler: impl Handler) -> Self {
        self.insert(capability, handler);
        self
    }

    /// Fills `capability` with `handler`, returning the handler it replaced.
    pub fn insert(&mut self, capability: Capability, handler: impl Handler) -> Option<BoxedHandler> {
        self.slots.insert(capability, handler.into_boxed_handler())
    }

    /// Empties `capability`, returning its handler if it had one.
    pub fn remove(&mut self, capability: Capability) -> Option<BoxedHandler> {
        self.slots.remove(&capability)
    }

    pub fn get(&self, capability: Capability) -> Option<&BoxedHandler> {
        self.slots.get(&capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.slots.contains_key(&capability)
    }

    /// Filled slots, in capability declaration order.
    pub fn present(&self) -> impl Iterator<Item = Capability> + '_ {
        self.slots.keys().copied()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.present()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};

    async fn ok(_req: Request) -> Response {
        Response::text("ok")
    }

    #[test]
    fn slots_are_independent_of_fill_order() {
        let a = CapabilitySet::new()
            .with(Capability::Health, ok)
            .with(Capability::FunctionLister, ok);
        let b = CapabilitySet::new()
            .with(Capability::FunctionLister, ok)
            .with(Capability::Health, ok);

        let a: Vec<_> = a.present().collect();
        let b: Vec<_> = b.present().collect();
        assert_eq!(a, b);
        assert_eq!(a, vec![Capability::FunctionLister, Capability::Health]);
    }

    #[test]
    fn refilling_a_slot_replaces_it() {
        let mut set = CapabilitySet::new();
        assert!(set.insert(Capability::Logs, ok).is_none());
        assert!(set.insert(Capability::Logs, ok).is_some());
        assert_eq!(set.present().count(), 1);

        assert!(set.remove(Capability::Logs).is_some());
        assert!(!set.contains(Capability::Logs));
    }

    #[test]
    fn names_are_kebab_case() {
        assert_eq!(Capability::KillAllInstance.to_string(), "kill-all-instance");
        assert_eq!(Capability::ALL.len(), 18);
    }
}
