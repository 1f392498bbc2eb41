use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "KNOWITALL_DATA_DIR";
const SAVEDATA_DIR_NAME: &str = "savedata";
const HISTORY_DB_FILE: &str = "history.db";

fn resolve_data_dir(override_dir: Option<String>, exe: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = override_dir.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    exe?.parent().map(|dir| dir.join(SAVEDATA_DIR_NAME))
}

/// `KNOWITALL_DATA_DIR`, else `<exe_dir>/savedata`. Created if missing.
pub(crate) fn data_dir() -> Result<PathBuf, String> {
    let exe = std::env::current_exe().ok();
    let dir = resolve_data_dir(std::env::var(DATA_DIR_ENV).ok(), exe.as_deref())
        .ok_or_else(|| "Failed to resolve data directory".to_string())?;
    std::fs::create_dir_all(&dir).map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
    Ok(dir)
}

/// Local conversation store used when no remote store is configured.
pub(crate) fn default_db_path() -> Result<PathBuf, String> {
    Ok(data_dir()?.join(HISTORY_DB_FILE))
}
