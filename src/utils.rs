use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{fs, io, path::Path, path::PathBuf};
use tracing::warn;

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    base.join("swing-scrape")
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn ledger_path() -> PathBuf {
    data_root().join("published.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(|err| {
            warn!("failed to create parent {:?}: {err}", parent);
            err
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_under_the_data_root() {
        assert!(ledger_path().starts_with(data_root()));
        assert!(config_path().ends_with("swing-scrape/config.json"));
    }

    #[test]
    fn ensure_parent_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a").join("b").join("out.json");
        ensure_parent(&file).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
        ensure_parent(Path::new("bare.json")).unwrap();
    }
}
