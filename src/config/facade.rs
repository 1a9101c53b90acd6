//! Loads configuration from every source in precedence order.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::TrellisConfig;
use config::{ConfigError, File};
use std::path::Path;

/// Entry point for reading [`TrellisConfig`].
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then the workspace files, then
    /// `TRELLIS__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<TrellisConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Defaults, then exactly `path`, then environment variables.
    pub fn load_from_file(path: &Path) -> Result<TrellisConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }
}
