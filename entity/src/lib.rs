pub mod chart_row;
pub mod enriched_row;
pub mod track_metadata;

pub mod prelude {
    pub use crate::chart_row::{ChartRecord, ChartRow};
    pub use crate::enriched_row::EnrichedRow;
    pub use crate::track_metadata::{ArtistMetadata, TrackMetadata};
}
