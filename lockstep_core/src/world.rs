//! External collaborators: the simulation itself, and the order processor
//! that applies deserialized orders to it.
//!
//! `OrderManager` never owns a `World` or an `OrderProcessor`, and neither
//! owns an `OrderManager` back — the three would otherwise form a
//! reference cycle, so both collaborators are passed in by the caller on
//! every tick instead of being held behind a back-pointer.

use crate::net::ClientId;
use crate::order_manager::OrderManager;

/// The simulation collaborator.
pub trait World {
    /// A deterministic, order-sensitive fingerprint of the current world
    /// state, used to detect divergence between peers.
    fn sync_hash(&self) -> u32;

    /// Simulation milliseconds advanced per net-frame.
    fn timestep_ms(&self) -> u32;

    /// Runs `f` with the sync-check guard transiently relaxed.
    ///
    /// When `check_enabled` is true, this asserts (in debug builds) that
    /// `f` did not change `sync_hash()` — immediate orders are allowed to
    /// touch UI/chat/mod-switch state but must never affect the
    /// lockstep-relevant world state outside of `process_orders`.
    fn run_unsynced<F: FnOnce(&mut Self)>(&mut self, check_enabled: bool, f: F)
    where
        Self: Sized,
    {
        if check_enabled {
            let before = self.sync_hash();
            f(self);
            debug_assert_eq!(
                before,
                self.sync_hash(),
                "immediate order mutated hash-affecting world state"
            );
        } else {
            f(self);
        }
    }
}

/// Applies one deserialized order to the world. Pure in the sense that
/// identical `(from_client, order, world-before)` triples yield identical
/// world mutations on every peer.
pub trait OrderProcessor<W: World> {
    fn process_order(&mut self, manager: &mut OrderManager, world: &mut W, from_client: ClientId, order: &[u8]);
}
