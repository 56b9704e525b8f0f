mod os;
mod paths;

pub use os::OsFamily;
pub use paths::{AppPaths, AppPathsError};
