pub mod result;
pub mod translator;

pub use result::{deepest_first, DocPartResult, InMemoryDocPartResult};
pub use translator::R2DTranslator;
