pub mod cache;
pub mod engine;
pub mod hash;
pub mod local;

pub use cache::{CacheEntry, ThemeCache, STATE_DIR};
pub use engine::ThemeSync;
pub use hash::ContentHash;
pub use local::THEME_DIRS;
