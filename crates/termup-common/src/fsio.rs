//! ---
//! termup_section: "01-core-functionality"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Atomic file replacement shared by the stores and the agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Replace `path` with `contents`.
///
/// The bytes go to a temporary sibling that is synced and then renamed over
/// `path`, so a reader sees either the previous file or the complete new one.
/// Missing parent directories are created. Blocking; async callers wrap it in
/// `spawn_blocking`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".termup-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    // On failure the temporary file is removed when the returned handle drops.
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replaces_contents_without_leftovers() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/version.txt");
        write_atomic(&target, b"1.1.0").unwrap();
        write_atomic(&target, b"1.2.0").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "1.2.0");

        let names: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("version.txt")]);
    }

    #[test]
    fn failed_rename_keeps_previous_file() {
        let dir = tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file.
        let target = dir.path().join("occupied");
        fs::create_dir_all(target.join("child")).unwrap();
        assert!(write_atomic(&target, b"x").is_err());
        assert!(target.join("child").is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
