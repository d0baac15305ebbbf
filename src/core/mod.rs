pub mod model;
pub mod resolver;

pub use model::{AssetFieldPath, AssetReference, PathStep, Probe};
pub use resolver::{resolve, resolve_all};
