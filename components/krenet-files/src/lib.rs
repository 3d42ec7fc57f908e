extern crate serde;

#[macro_use]
extern crate serde_derive;

pub mod network_manifest;
pub mod project_manifest;

pub use network_manifest::{
    AccountConfig, ConfigurationError, EvmNetwork, NetworkConfig, NetworkManifest,
    DEFAULT_DEPLOYER_LABEL,
};
pub use project_manifest::{ContractConfig, ProjectConfig, ProjectManifest};

use std::path::{Path, PathBuf};

/// Location of a file relative to a Krenet project. All manifests, plan
/// files and artifacts are addressed through this type.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FileLocation {
    pub path: PathBuf,
}

impl FileLocation {
    pub fn from_path(path: PathBuf) -> FileLocation {
        FileLocation { path }
    }

    pub fn from_path_string(path_string: &str) -> Result<FileLocation, String> {
        let path = PathBuf::from(path_string);
        if path.as_os_str().is_empty() {
            return Err(format!("unable to parse path {}", path_string));
        }
        Ok(FileLocation { path })
    }

    pub fn append_path(&mut self, path_string: &str) -> Result<(), String> {
        let suffix = PathBuf::from(path_string);
        if suffix.is_absolute() {
            return Err(format!(
                "unable to append absolute path {} to {}",
                path_string,
                self.to_display_string()
            ));
        }
        self.path.push(suffix);
        Ok(())
    }

    pub fn get_parent_location(&self) -> Result<FileLocation, String> {
        match self.path.parent() {
            Some(parent) => Ok(FileLocation {
                path: parent.to_path_buf(),
            }),
            None => Err(format!(
                "unable to get parent location of {}",
                self.to_display_string()
            )),
        }
    }

    /// The directory containing the project manifest.
    pub fn get_project_root_location(&self) -> Result<FileLocation, String> {
        self.get_parent_location()
    }

    pub fn get_file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read_content(&self) -> Result<Vec<u8>, String> {
        std::fs::read(&self.path)
            .map_err(|e| format!("unable to read file {} ({})", self.to_display_string(), e))
    }

    pub fn read_content_as_utf8(&self) -> Result<String, String> {
        let content = self.read_content()?;
        String::from_utf8(content)
            .map_err(|e| format!("unable to read file {} ({})", self.to_display_string(), e))
    }

    pub fn write_content(&self, content: &[u8]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                format!("unable to create directory {} ({})", parent.display(), e)
            })?;
        }
        std::fs::write(&self.path, content)
            .map_err(|e| format!("unable to write file {} ({})", self.to_display_string(), e))
    }

    pub fn to_display_string(&self) -> String {
        self.path.display().to_string()
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

pub const PROJECT_MANIFEST_FILE_NAME: &str = "Krenet.toml";

/// Resolves the project manifest: the given path when provided,
/// otherwise the first `Krenet.toml` found walking up from the current
/// directory.
pub fn get_manifest_location(path: Option<String>) -> Option<FileLocation> {
    if let Some(path) = path {
        let manifest_path = PathBuf::from(path);
        if !manifest_path.exists() {
            return None;
        }
        return Some(FileLocation::from_path(manifest_path));
    }
    let mut current_dir = std::env::current_dir().ok()?;
    loop {
        let manifest_path = current_dir.join(PROJECT_MANIFEST_FILE_NAME);
        if manifest_path.exists() {
            return Some(FileLocation::from_path(manifest_path));
        }
        if !current_dir.pop() {
            return None;
        }
    }
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::FileLocation;

    #[test]
    fn append_path_rejects_absolute_suffixes() {
        let mut location = FileLocation::from_path_string("/tmp/project").unwrap();
        assert!(location.append_path("/etc/passwd").is_err());
        assert!(location.append_path("settings/Networks.toml").is_ok());
        assert_eq!(
            location.to_display_string(),
            "/tmp/project/settings/Networks.toml"
        );
    }

    #[test]
    fn parent_location() {
        let location = FileLocation::from_path_string("/tmp/project/Krenet.toml").unwrap();
        let parent = location.get_parent_location().unwrap();
        assert_eq!(parent.to_display_string(), "/tmp/project");
    }
}
