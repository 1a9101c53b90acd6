//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key, so a file that only sets
/// `node_types.map.title` keeps every other default.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.root", "data")?
        .set_default("node_types.map.title", "Map")?
        .set_default("node_types.waypoint.title", "Waypoints")?
        .set_default("node_types.user.title", "Users")?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
