//! Global voice registry
//!
//! An insertion-ordered set of the voices currently sounding (or committed
//! to sound). Registration is idempotent; deregistration of an absent
//! voice is a no-op that reports false.

use crate::voice::VoiceId;

#[derive(Default)]
pub struct VoiceRegistry {
    order: Vec<VoiceId>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a voice. Returns false if it was already registered.
    pub fn add(&mut self, id: VoiceId) -> bool {
        if self.order.contains(&id) {
            return false;
        }
        self.order.push(id);
        true
    }

    /// Remove a voice. Returns whether it was present.
    pub fn remove(&mut self, id: VoiceId) -> bool {
        let before = self.order.len();
        self.order.retain(|&v| v != id);
        self.order.len() != before
    }

    pub fn contains(&self, id: VoiceId) -> bool {
        self.order.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    /// Registered voices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = VoiceId> + '_ {
        self.order.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut reg = VoiceRegistry::new();
        let a = VoiceId(1);
        assert!(reg.add(a));
        assert!(!reg.add(a));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut reg = VoiceRegistry::new();
        let a = VoiceId(1);
        let b = VoiceId(2);
        reg.add(a);
        assert!(!reg.remove(b));
        assert!(reg.remove(a));
        assert!(reg.is_empty());
    }

    #[test]
    fn iterates_in_registration_order() {
        let mut reg = VoiceRegistry::new();
        for n in [3u64, 1, 2] {
            reg.add(VoiceId(n));
        }
        let ids: Vec<u64> = reg.iter().map(|v| v.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }
}
