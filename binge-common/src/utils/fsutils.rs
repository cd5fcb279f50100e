use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Try to read the file, return None if it doesn't exist.
pub fn read_optional_file(path: impl AsRef<Path>) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
        Ok(s) => Ok(Some(s)),
    }
}

/// Copies `path` to a sibling file with a `.bak` suffix, overwriting any previous backup.
/// No-op if `path` doesn't exist yet.
pub fn backup_file(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(());
    }
    let mut backup: PathBuf = path.to_path_buf();
    let new_ext = match backup.extension() {
        Some(ext) => format!("{}.bak", ext.to_string_lossy()),
        None => "bak".to_string(),
    };
    backup.set_extension(new_ext);
    fs::copy(path, backup).map(|_| ())
}

/// Collects all files in the given directories, does not walk them recursively.
pub fn all_files<R>(folders: impl IntoIterator<Item = impl AsRef<Path>>) -> io::Result<R>
where
    R: FromIterator<PathBuf>,
{
    let iters: Result<Vec<_>, _> = folders
        .into_iter()
        .map(|path| fs::read_dir(path))
        .collect();

    iters?
        .into_iter()
        .flatten()
        .map(|entry| entry.map(|entry| entry.path()))
        .collect()
}
