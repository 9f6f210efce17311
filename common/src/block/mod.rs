mod complete;
mod header;
mod merkle;

pub use complete::{BlockBloom, BlockComplete};
pub use header::{
    compute_kernel_hash, kernel_meets_target, BlockHeader, BLOCK_VERSION,
};
pub use merkle::merkle_root;
