//! Materials
//!
//! Two representations:
//!
//! * `Particle` - cohesive SPH blobs (blob, honey, spray)
//! * `Grid` - thin films carried by the grid scalar field (ink, oil film)

pub mod families;
pub mod material_types;
pub mod registry;
pub mod utils;

pub use families::{GridMaterial, MaterialParameters, ParticleMaterial};
pub use material_types::{Material, MaterialId, PaintOutcome, PaintTarget, Paintable};
pub use registry::MaterialRegistry;
pub use utils::check;
