//! A named, ordered group of peers (§3 "Context").

use crate::vaddr::{ContextId, VAddr};

/// An ordered peer group plus its identifier. Contexts created for peers not
/// in their membership are "invalid": [`Context::valid`] returns false and
/// communication operations against them return `ProtocolError::InvalidContext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    id: ContextId,
    members: Vec<VAddr>,
    valid: bool,
}

impl Context {
    pub fn new(id: ContextId, mut members: Vec<VAddr>) -> Self {
        members.sort_unstable();
        Self {
            id,
            members,
            valid: true,
        }
    }

    pub fn invalid(id: ContextId) -> Self {
        Self {
            id,
            members: Vec::new(),
            valid: false,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn members(&self) -> &[VAddr] {
        &self.members
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// This peer's index within the context's ordered VAddr list.
    pub fn rank_of(&self, vaddr: VAddr) -> Option<usize> {
        self.members.iter().position(|&m| m == vaddr)
    }

    pub fn coordinator(&self) -> Option<VAddr> {
        self.members.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_is_index_in_sorted_membership() {
        let ctx = Context::new(ContextId(1), vec![VAddr(5), VAddr(1), VAddr(3)]);
        assert_eq!(ctx.rank_of(VAddr(1)), Some(0));
        assert_eq!(ctx.rank_of(VAddr(3)), Some(1));
        assert_eq!(ctx.rank_of(VAddr(5)), Some(2));
        assert_eq!(ctx.rank_of(VAddr(9)), None);
    }

    #[test]
    fn coordinator_is_lowest_vaddr() {
        let ctx = Context::new(ContextId(0), vec![VAddr(5), VAddr(1), VAddr(3)]);
        assert_eq!(ctx.coordinator(), Some(VAddr(1)));
    }

    #[test]
    fn invalid_context_has_no_members() {
        let ctx = Context::invalid(ContextId(3));
        assert!(!ctx.valid());
        assert!(ctx.members().is_empty());
    }
}
