pub mod constraints;
pub mod factory;

pub use constraints::{DefaultIdentifierConstraints, IdentifierConstraints};
pub use factory::IdentifierFactory;
