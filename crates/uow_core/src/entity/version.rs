//! Optimistic version marker.

use crate::types::TransactionToken;

/// Per-object stamp a transaction claims to signal exclusive pending
/// ownership.
///
/// A marker is either free or locked by exactly one transaction token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionMarker {
    owner: Option<TransactionToken>,
}

impl VersionMarker {
    /// Creates a free marker.
    #[must_use]
    pub const fn new() -> Self {
        Self { owner: None }
    }

    /// Claims the marker for `owner`.
    ///
    /// Claiming a marker already held by the same owner succeeds.
    ///
    /// # Errors
    ///
    /// Returns the current holder if another token owns the marker.
    pub fn lock(&mut self, owner: TransactionToken) -> Result<(), TransactionToken> {
        match self.owner {
            Some(holder) if holder != owner => Err(holder),
            _ => {
                self.owner = Some(owner);
                Ok(())
            }
        }
    }

    /// Frees the marker unconditionally.
    pub fn unlock(&mut self) {
        self.owner = None;
    }

    /// Frees the marker if `owner` holds it. Returns whether it did.
    pub fn release(&mut self, owner: TransactionToken) -> bool {
        if self.owner == Some(owner) {
            self.owner = None;
            true
        } else {
            false
        }
    }

    /// Returns `true` if any transaction holds the marker.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    /// The holding transaction, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<TransactionToken> {
        self.owner
    }
}
