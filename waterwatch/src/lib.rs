pub mod command;
pub mod feed;
pub mod settings;
pub mod telemetry;

pub use command::Command;
pub use feed::{Feed, FeedError, FeedEvent, RawRecord};
pub use settings::Settings;
pub use telemetry::{History, LineParser, Reading, WaterLevel};
