pub mod threshold;
pub mod labelling;
pub mod morphology;
pub mod extraction;
pub mod validity;
pub mod simplification;
pub mod topology;
pub mod postprocess;

pub use threshold::*;
pub use labelling::*;
pub use morphology::*;
pub use extraction::*;
pub use validity::*;
pub use simplification::*;
pub use topology::*;
pub use postprocess::*;
