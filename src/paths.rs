//! Per-user directory resolution. The data directory (logs + settings)
//! lives under the platform application-data location; generated invoices
//! go under the user's Documents folder.

use std::fs;
use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs, UserDirs};

use crate::error::{Error, Result};

const APP_DIR_NAME: &str = "InvoiceDesk";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "invoice-desk", "invoice-desk").ok_or(Error::NoUserDirs)
}

/// App-level config file (data root override), TOML, in the platform
/// config directory.
pub fn config_file() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    fs::create_dir_all(dirs.config_dir())?;
    Ok(dirs.config_dir().join("settings.toml"))
}

/// Default data directory holding the profile/history logs and settings
/// document; created on first use.
pub fn user_data_dir() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    fs::create_dir_all(dirs.data_dir())?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Where generated invoice documents land: `Documents/InvoiceDesk/invoices`,
/// falling back to the home directory when no Documents folder exists.
pub fn invoices_dir() -> Result<PathBuf> {
    let user_dirs = UserDirs::new().ok_or(Error::NoUserDirs)?;
    let base = user_dirs
        .document_dir()
        .map(PathBuf::from)
        .unwrap_or_else(|| user_dirs.home_dir().to_path_buf());
    let target = base.join(APP_DIR_NAME).join("invoices");
    fs::create_dir_all(&target)?;
    Ok(target)
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
