use cvd_walkthrough_core::{
    LatticeIndex, ParticleId, ParticleKind, ParticleSnapshot, ParticleState, Vec3,
};

/// Hands out world-unique particle identifiers.
#[derive(Debug, Default)]
pub(crate) struct ParticleIds {
    next: u32,
}

impl ParticleIds {
    pub(crate) fn allocate(&mut self) -> ParticleId {
        let id = ParticleId::new(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Particle {
    pub(crate) id: ParticleId,
    pub(crate) kind: ParticleKind,
    pub(crate) position: Vec3,
    pub(crate) slot: Option<LatticeIndex>,
    pub(crate) state: ParticleState,
}

impl Particle {
    pub(crate) fn new(id: ParticleId, kind: ParticleKind, position: Vec3) -> Self {
        Self {
            id,
            kind,
            position,
            slot: None,
            state: ParticleState::Arriving,
        }
    }

    pub(crate) fn has_settled(&self) -> bool {
        matches!(self.state, ParticleState::Settled | ParticleState::Fading)
    }

    pub(crate) fn snapshot(&self) -> ParticleSnapshot {
        ParticleSnapshot {
            id: self.id,
            kind: self.kind,
            position: self.position,
            slot: self.slot,
            state: self.state,
        }
    }
}
