use rand::RngCore;

/// Length in bytes of a segment's random identity (§3 "Segment" — immutable
/// once assigned, used to cross-check compound-file headers against their
/// owning segment).
pub const ID_LENGTH: usize = 16;

pub fn random_id() -> [u8; ID_LENGTH] {
    let mut id = [0u8; ID_LENGTH];
    rand::thread_rng().fill_bytes(&mut id);
    id
}
