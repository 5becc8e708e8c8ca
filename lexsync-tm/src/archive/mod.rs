//! Object archive access
//!
//! Archive layout:
//! - `migrations/{interface}/{filename}` migration files plus `manifest.json`
//! - `backups/{interface}/{interface}_{operation}_{YYYY-MM-DD_HHMMSS}.{format}`

mod client;
mod fs;
mod store;

pub use client::{sha256_hex, ArchiveClient, Manifest};
pub use fs::FsArchiveStore;
pub use store::ArchiveStore;

/// Reserved object under the migration prefix, never a migration itself
pub const MANIFEST_FILENAME: &str = "manifest.json";

pub fn migration_prefix(interface: &str) -> String {
    format!("migrations/{}/", interface)
}

pub fn migration_path(interface: &str, filename: &str) -> String {
    format!("migrations/{}/{}", interface, filename)
}

pub fn backup_prefix(interface: &str) -> String {
    format!("backups/{}/", interface)
}

/// Final path segment of an archive object
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
