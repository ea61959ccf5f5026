pub mod quotes;
pub mod scans;

pub use quotes::{GuildInfo, QuoteService, ScanHandle};
pub use scans::{ScanGuard, ScanRegistry};
