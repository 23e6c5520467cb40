mod backend;
pub mod backends;
mod factory;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, ScriptedFrame, StubBackend};
pub use factory::{build_backend, BackendKind};
pub use result::{BoundingBox, Detection};
