pub mod arxiv;
pub mod traits;

pub use arxiv::ArxivProvider;
pub use traits::{MetadataProvider, ProviderError, SearchQuery};
