//! Hierarchy resolver: walks parent references upward from the initiator.
//!
//! Level 1 is the initiator itself, level n+1 is level n's parent. The walk
//! stops at the first missing parent, at the first id that does not resolve
//! to a promoter, at a repeated id, or after `max_levels` hops, whichever
//! comes first.

use crate::{
    error::CommissionResult,
    types::{Level, PromoterId},
};
use std::collections::HashMap;

/// Read access to the promoter table, as much as the walk needs.
pub trait PromoterLookup {
    /// Returns `Some(parent)` when the promoter exists (the parent itself may
    /// be `None`), `None` when the id does not resolve.
    fn parent_of(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLevel {
    pub level: Level,
    pub recipient_id: PromoterId,
}

pub fn resolve_chain<L: PromoterLookup + ?Sized>(
    lookup: &L,
    initiator_id: &str,
    max_levels: usize,
) -> CommissionResult<Vec<ResolvedLevel>> {
    let mut chain: Vec<ResolvedLevel> = Vec::with_capacity(max_levels);
    let mut current: Option<PromoterId> = Some(initiator_id.to_string());

    while let Some(id) = current.take() {
        if chain.len() >= max_levels {
            break;
        }
        if chain.iter().any(|r| r.recipient_id == id) {
            log::warn!(
                "Cycle in promoter hierarchy at '{id}' (initiator '{initiator_id}'); walk stopped at level {}",
                chain.len()
            );
            break;
        }
        let Some(parent) = lookup.parent_of(&id)? else {
            log::debug!("Promoter '{id}' does not resolve; walk stopped at level {}", chain.len());
            break;
        };
        chain.push(ResolvedLevel {
            level: (chain.len() + 1) as Level,
            recipient_id: id,
        });
        current = parent;
    }

    Ok(chain)
}

/// In-memory lookup: promoter id → parent id.
impl PromoterLookup for HashMap<PromoterId, Option<PromoterId>> {
    fn parent_of(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>> {
        Ok(self.get(promoter_id).cloned())
    }
}
