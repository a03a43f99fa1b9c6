pub mod spatial_hash;

pub use spatial_hash::{Neighbor, PackedCell, SpatialHashGrid, pack_coords, unpack_coords};
