pub mod client;
pub mod error;
pub mod handler;
pub mod normalize;
pub mod types;
pub mod wbi;

pub use client::{StatsConfig, VideoStatsClient, parse_stats_response};
pub use error::{StatsError, StatsResult};
pub use handler::parse_params;
pub use types::{FieldsEntry, HandlerInput, HandlerOutput, VideoStatFields};
pub use wbi::{RequestParams, WbiSignature, WbiSigner};
