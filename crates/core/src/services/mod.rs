mod count;
mod envelope;
mod listing;

pub use count::{CountMode, choose_strategy};
pub use envelope::{EnvelopeBuilder, PageMeta, PaginationEnvelope};
pub use listing::{ListingConfig, ListingRequest, ListingService};
