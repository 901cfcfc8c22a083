//! Test utilities for creating temporary log files and simulating rotation.

#[cfg(test)]
use std::fs::{self, File, OpenOptions};
#[cfg(test)]
use std::io::Write;
#[cfg(test)]
use std::path::{Path, PathBuf};

#[cfg(test)]
pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

#[cfg(test)]
impl TempLogFile {
    /// Create a new, empty temporary log file for testing
    pub fn new() -> std::io::Result<Self> {
        Self::named("test.log")
    }

    /// Create a new, empty temporary log file with the given file name
    pub fn named(file_name: &str) -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join(file_name);

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Append content followed by a newline
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;

        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(())
    }

    /// Append content exactly as given, without adding a newline
    pub fn append_raw(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;

        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place (copy-truncate rotation)
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Rename the file to `<name>.1` and create a new empty file at the
    /// original path, the way logrotate does
    pub fn rotate(&self) -> std::io::Result<PathBuf> {
        let rotated = self.rotated_path();
        fs::rename(&self.path, &rotated)?;
        File::create(&self.path)?;
        Ok(rotated)
    }

    /// Delete the file
    pub fn remove(&self) -> std::io::Result<()> {
        fs::remove_file(&self.path)
    }

    /// Create the file again after `remove`, with initial raw content
    pub fn recreate_with(&self, content: &str) -> std::io::Result<()> {
        fs::write(&self.path, content)
    }

    /// Path the file is moved to by `rotate`
    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".1");
        PathBuf::from(name)
    }

    /// Directory holding the file, for creating siblings
    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_temp_log_file_with_content() {
        let content = "test line";
        let temp_file = TempLogFile::with_content(content).unwrap();

        let file_content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(file_content, "test line\n");
    }

    #[tokio::test]
    async fn test_append_raw_adds_no_newline() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_raw("partial").unwrap();
        temp_file.append_raw("-done\n").unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "partial-done\n");
    }

    #[tokio::test]
    async fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_rotate() {
        let temp_file = TempLogFile::with_content("old").unwrap();
        let rotated = temp_file.rotate().unwrap();

        assert_eq!(rotated, temp_file.dir().join("test.log.1"));
        assert_eq!(std::fs::read_to_string(&rotated).unwrap(), "old\n");
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn test_remove_and_recreate() {
        let temp_file = TempLogFile::with_content("gone").unwrap();
        temp_file.remove().unwrap();
        assert!(!temp_file.path().exists());

        temp_file.recreate_with("back\n").unwrap();
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "back\n");
    }
}
