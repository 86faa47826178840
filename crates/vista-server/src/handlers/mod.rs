pub mod cameras;
pub mod media;

pub use cameras::*;
pub use media::*;
