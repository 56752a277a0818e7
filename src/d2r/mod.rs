pub mod rid;
pub mod collection_data;
pub mod translator;

pub use collection_data::{CollectionData, DocPartData, DocPartRow};
pub use rid::{InMemoryRidGenerator, RidGenerator};
pub use translator::D2RTranslator;
