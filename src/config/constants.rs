// Default physical and numerical constants for the blob simulation

// Fixed timestep
pub const TIMESTEP: f32 = 1.0 / 60.0;

// Simulation domain is the unit square with a circular plate at its center
pub const DOMAIN_SIZE: f32 = 1.0;
pub const PLATE_RADIUS: f32 = 0.45;
pub const REMOVAL_TOLERANCE: f32 = 0.02;

// Particle phase
pub const SMOOTHING_RADIUS: f32 = 0.008;
pub const PARTICLE_CAP: usize = 20_000;
pub const REST_DENSITY: f32 = 1000.0;

// Equation of state parameters
pub const EOS_STIFFNESS: f32 = 5.0;
pub const EOS_POWER: i32 = 4;

// Blob cohesion
pub const COHESION_STIFFNESS: f32 = 5000.0;
pub const LONG_RANGE_COHESION: f32 = 0.02;
pub const MIN_COHESION_RATIO: f32 = 100.0;

// Grid phase
pub const GRID_RESOLUTION: usize = 64;
pub const MIN_GRID_RESOLUTION: usize = 4;
pub const PRESSURE_ITERATIONS: usize = 200;
pub const PRESSURE_TOLERANCE: f32 = 1e-4;

// Implicit particle solve
pub const CG_TOLERANCE: f32 = 1e-4;
pub const CG_MAX_ITERATIONS: usize = 60;
pub const JACOBIAN_ENTRY_THRESHOLD: f32 = 1e-6;

// Field reconstruction
pub const FIELD_RESOLUTION: usize = 128;
pub const SURFACE_THRESHOLD: f32 = 1.0;
