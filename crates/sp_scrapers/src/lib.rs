pub mod collector;
pub mod extractor;
pub mod fetcher;

pub use collector::{Collection, Collector};
pub use extractor::Extractor;
pub use fetcher::{Fetch, HttpFetcher, StaticFetcher};

pub mod prelude {
    pub use super::{Collection, Collector, Extractor, Fetch, HttpFetcher};
}
