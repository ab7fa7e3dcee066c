//! Purchase gate: may this caller obtain this item's file?

use uuid::Uuid;

use scriptshop_store::{Database, Item, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Access::Allowed
    }
}

/// Free items are always allowed. Priced items need a completed payment
/// for exactly this `(user, item)` pair; anonymous callers are denied.
/// Read-only.
pub fn check(db: &Database, user: Option<Uuid>, item: &Item) -> Result<Access, StoreError> {
    if item.is_free() {
        return Ok(Access::Allowed);
    }
    let Some(user) = user else {
        return Ok(Access::Denied);
    };
    if db.has_completed_payment(user, item.id)? {
        Ok(Access::Allowed)
    } else {
        Ok(Access::Denied)
    }
}
