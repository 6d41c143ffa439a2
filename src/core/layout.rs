//! Remote filesystem layout for one application.
//!
//! ```text
//! {app_root}/{app}/release/{release}/   per-release payload
//! {app_root}/{app}/current              symlink to the live release
//! {unit_dir}/{app}.service              installed service unit
//! ```

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    app_root: String,
    unit_dir: String,
    app_name: String,
}

impl RemoteLayout {
    pub fn new(app_root: &str, unit_dir: &str, app_name: &str) -> Self {
        Self {
            app_root: app_root.trim_end_matches('/').to_string(),
            unit_dir: unit_dir.trim_end_matches('/').to_string(),
            app_name: app_name.to_string(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn app_dir(&self) -> String {
        format!("{}/{}", self.app_root, self.app_name)
    }

    pub fn release_root(&self) -> String {
        format!("{}/release", self.app_dir())
    }

    pub fn release_dir(&self, release: &str) -> String {
        format!("{}/{}", self.release_root(), release)
    }

    pub fn current_link(&self) -> String {
        format!("{}/current", self.app_dir())
    }

    pub fn unit_file_name(&self) -> String {
        format!("{}.service", self.app_name)
    }

    pub fn staged_unit_path(&self) -> String {
        format!("{}/{}", self.release_root(), self.unit_file_name())
    }

    pub fn installed_unit_path(&self) -> String {
        format!("{}/{}", self.unit_dir, self.unit_file_name())
    }
}
