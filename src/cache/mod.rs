// Cache module.
// In-process response cache for upstream reads and the view cache fed by the primer.

pub mod paths;
pub mod response;
pub mod store;
pub mod view;

pub use response::{DEFAULT_CAPACITY, DEFAULT_TTL, ResponseCache};
pub use store::{CachedData, read_cached, read_dir_cached, write_cached};
pub use view::ViewCache;
