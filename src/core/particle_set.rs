use crate::core::Particle;
use crate::math::Vector;

/// Particle storage kept in spawn order, so the oldest particles are always
/// at the front.
#[derive(Clone, Debug, Default)]
pub struct ParticleSet {
    particles: Vec<Particle>,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.particles.iter_mut()
    }

    pub fn insert(&mut self, particle: Particle) -> usize {
        let index = self.particles.len();
        self.particles.push(particle);
        index
    }

    pub fn insert_batch(&mut self, mut batch: Vec<Particle>) {
        self.particles.append(&mut batch);
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Particle> {
        self.particles.get_mut(index)
    }

    pub fn positions(&self) -> Vec<Vector> {
        self.particles.iter().map(|p| p.position).collect()
    }

    /// Drops the `count` oldest particles. Returns how many were removed.
    pub fn evict_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.particles.len());
        self.particles.drain(..count);
        count
    }

    /// Removes particles matching `predicate`, keeping spawn order.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Particle) -> bool,
    {
        let before = self.particles.len();
        self.particles.retain(|particle| !predicate(particle));
        before - self.particles.len()
    }
}
