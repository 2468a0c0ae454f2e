pub mod camera;
pub mod error;
pub mod layer;
pub mod snapshot;
pub mod source;
pub mod style;
pub mod symbology;

pub use camera::*;
pub use error::*;
pub use layer::*;
pub use snapshot::*;
pub use source::*;
pub use symbology::*;
