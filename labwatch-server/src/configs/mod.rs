mod cache;
mod history;
mod settings;
mod store;

use std::path::PathBuf;
use std::{env, io};

pub use cache::ConfigCache;
pub use history::{History, HistoryEntry, JsonHistory};
pub use settings::{Logger, Modem, Monitor, Power, Settings, Storage};
pub use store::{ConfigStore, JsonConfigStore};

/// Resolves relative paths against the working directory
pub fn normalize_path(path: &str) -> io::Result<PathBuf> {
    let path_buf = PathBuf::from(path);

    Ok(if path_buf.is_absolute() {
        path_buf
    } else {
        env::current_dir()?.join(&path_buf)
    })
}
