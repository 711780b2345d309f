pub mod archive;
pub mod deliver;
pub mod normalize;
pub mod orchestrator;
pub mod pagedata;
pub mod score;
pub mod strategy;
pub mod ytdlp;

pub use deliver::{AssetFetcher, ByteStream, CdnFetcher, Delivery, Streamer, ToolStreamer};
pub use orchestrator::Resolver;
pub use ytdlp::YtDlp;
