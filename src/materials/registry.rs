use indexmap::IndexMap;

use crate::config::{MIN_COHESION_RATIO, SimConfig};
use crate::error::{SimError, SimResult};
use crate::materials::families::{GridMaterial, ParticleMaterial};
use crate::materials::material_types::{Material, MaterialId};
use crate::materials::utils::check;

/// Materials known to the simulation, in registration order.
#[derive(Debug, Clone, Default)]
pub struct MaterialRegistry {
    materials: IndexMap<MaterialId, Material>,
    next_id: u32,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blob, honey and spray particles plus ink and oil-film grid materials.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Material::Particle(ParticleMaterial::blob()));
        registry.register(Material::Particle(ParticleMaterial::honey()));
        registry.register(Material::Particle(ParticleMaterial::spray()));
        registry.register(Material::Grid(GridMaterial::ink()));
        registry.register(Material::Grid(GridMaterial::oil_film()));
        registry
    }

    pub fn register(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.next_id);
        self.next_id += 1;
        self.materials.insert(id, material);
        id
    }

    pub fn get(&self, id: MaterialId) -> SimResult<&Material> {
        self.materials.get(&id).ok_or(SimError::UnknownMaterial(id))
    }

    pub fn particle(&self, id: MaterialId) -> Option<&ParticleMaterial> {
        self.materials.get(&id).and_then(Material::as_particle)
    }

    pub fn find(&self, name: &str) -> Option<MaterialId> {
        self.materials
            .iter()
            .find(|(_, material)| material.name() == name)
            .map(|(&id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter().map(|(&id, material)| (id, material))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Coefficients that will run but misbehave.
    pub fn warnings(&self, config: &SimConfig) -> Vec<SimError> {
        let mut warnings = Vec::new();
        let mut warn = |name: &str, msg: String| {
            warnings.push(SimError::InvalidConfiguration(format!("{name}: {msg}")));
        };

        for (_, material) in self.iter() {
            match material {
                Material::Particle(particle) => {
                    let params = &particle.params;
                    if !check::density_ok(params.rest_density) {
                        warn(
                            particle.name,
                            format!("rest density {} out of range", params.rest_density),
                        );
                    }
                    if !check::viscosity_ok(params.viscosity) {
                        warn(
                            particle.name,
                            format!("viscosity {} out of range", params.viscosity),
                        );
                    }
                    if !check::stiffness_ok(params.cohesion_stiffness)
                        || !check::stiffness_ok(params.pressure_stiffness)
                    {
                        warn(particle.name, "stiffness out of range".to_string());
                    }
                    if !check::drag_ok(params.drag_coefficient, config.dt) {
                        warn(
                            particle.name,
                            format!(
                                "drag {} overshoots at dt {}",
                                params.drag_coefficient, config.dt
                            ),
                        );
                    }
                    if particle.forms_blobs
                        && !check::cohesion_ratio_ok(
                            params.cohesion_stiffness,
                            params.pressure_stiffness,
                            MIN_COHESION_RATIO,
                        )
                    {
                        warn(
                            particle.name,
                            format!(
                                "cohesion {} must exceed pressure stiffness {} by {}x to form blobs",
                                params.cohesion_stiffness,
                                params.pressure_stiffness,
                                MIN_COHESION_RATIO
                            ),
                        );
                    }
                    if particle.spawn_count == 0 {
                        warn(particle.name, "spawn count is zero".to_string());
                    }
                }
                Material::Grid(grid) => {
                    if !(grid.deposit.is_finite() && grid.max_thickness > 0.0) {
                        warn(grid.name, "deposit must be finite with a positive ceiling".to_string());
                    }
                }
            }
        }
        warnings
    }
}
