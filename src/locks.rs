//! Per-entity mutual exclusion for long-running transitions. A claim is held
//! for the whole operation (including any spawned task) and released on drop;
//! a second claimant gets `None` and surfaces `Conflict` instead of queueing.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Application,
    Image,
    Deployment,
}

type Held = Arc<Mutex<HashSet<(Resource, Uuid)>>>;

#[derive(Clone, Default)]
pub struct OpLocks {
    held: Held,
}

pub struct Claim {
    held: Held,
    key: (Resource, Uuid),
}

impl OpLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_claim(&self, resource: Resource, id: Uuid) -> Option<Claim> {
        let mut guard = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if guard.insert((resource, id)) {
            Some(Claim { held: self.held.clone(), key: (resource, id) })
        } else {
            None
        }
    }

    pub fn is_held(&self, resource: Resource, id: Uuid) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(resource, id))
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_rejected_until_release() {
        let locks = OpLocks::default();
        let id = Uuid::new_v4();
        let claim = locks.try_claim(Resource::Image, id).expect("first claim");
        assert!(locks.try_claim(Resource::Image, id).is_none());
        // A different entity is unaffected.
        assert!(locks.try_claim(Resource::Image, Uuid::new_v4()).is_some());
        drop(claim);
        assert!(locks.try_claim(Resource::Image, id).is_some());
    }

    #[test]
    fn kinds_do_not_collide() {
        let locks = OpLocks::default();
        let id = Uuid::new_v4();
        let _a = locks.try_claim(Resource::Application, id).expect("app claim");
        assert!(locks.try_claim(Resource::Deployment, id).is_some());
    }
}
