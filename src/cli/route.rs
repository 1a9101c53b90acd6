//! CLI route: single route table and run context. Dispatches to the store and presentation.

use crate::cli::help::{command_name, is_mutating};
use crate::cli::parse::Commands;
use crate::cli::presentation::{format_delta, format_node, format_node_list};
use crate::config::TrellisConfig;
use crate::error::ApiError;
use crate::store::{FileStore, LoadReport, TreeStore};
use crate::tree::metrics::{MetricUpdate, SetMetrics, SetMetricsUpdate};
use crate::tree::{Metadata, NodeProperties, NodeUpdates, REFERENCE_MAP_NODE_ID};
use std::path::{Path, PathBuf};
use tracing::{info, info_span, Instrument};

/// Runtime context for CLI execution: workspace, configuration and the open store.
pub struct RunContext {
    workspace_root: PathBuf,
    config: TrellisConfig,
    runtime: tokio::runtime::Runtime,
    store: FileStore,
    load_report: LoadReport,
}

impl RunContext {
    /// Load configuration and open the store under the workspace.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = TrellisConfig::load_validated(&workspace_root, config_path.as_deref())?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start runtime: {}", e)))?;

        let storage_root = config.storage.resolve(&workspace_root);
        let (store, load_report) =
            runtime.block_on(FileStore::open(&storage_root, config.node_types.clone()))?;

        Ok(Self {
            workspace_root,
            config,
            runtime,
            store,
            load_report,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let span = info_span!("command", name = command_name(command));
        let result = self
            .runtime
            .block_on(self.execute_inner(command).instrument(span));
        if result.is_ok() && is_mutating(command) {
            info!(command = command_name(command), "Tree updated");
        }
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Create {
                node_type,
                title,
                description,
                parent,
                index,
                state,
                readiness,
                reference,
            } => {
                let mut metadata = Metadata::new();
                if let Some(reference) = reference {
                    metadata.insert(
                        REFERENCE_MAP_NODE_ID.to_string(),
                        serde_json::Value::String(reference.to_string()),
                    );
                }
                let properties = NodeProperties {
                    title: title.clone(),
                    description: description.clone().unwrap_or_default(),
                    metadata,
                    set_metrics: SetMetrics {
                        readiness_level: *readiness,
                    },
                    node_state: *state,
                };
                let delta = self
                    .store
                    .create_node(*node_type, properties, *parent, *index)
                    .await?;
                format_delta(&delta)
            }
            Commands::Update {
                id,
                title,
                description,
                state,
                readiness,
                clear_readiness,
            } => {
                let readiness_level = match (readiness, clear_readiness) {
                    (_, true) => MetricUpdate::Clear,
                    (Some(level), false) => MetricUpdate::Set(*level),
                    (None, false) => MetricUpdate::Keep,
                };
                let updates = NodeUpdates {
                    title: title.clone(),
                    description: description.clone(),
                    metadata: None,
                    set_metrics: SetMetricsUpdate { readiness_level },
                    node_state: *state,
                };
                let delta = self.store.update_node(*id, updates).await?;
                format_delta(&delta)
            }
            Commands::Remove { id } => format_delta(&self.store.remove_node(*id).await?),
            Commands::Move { id, parent, index } => {
                format_delta(&self.store.set_node_parent(*id, *parent, *index).await?)
            }
            Commands::List { node_type, format } => {
                let nodes = self.store.get_all_nodes().await?;
                format_node_list(&nodes, *node_type, *format)
            }
            Commands::Show { id, format } => {
                let node = self.store.get_node(*id).await?;
                format_node(&node, *format)
            }
            Commands::Sync { waypoint } => format_delta(&self.store.sync_waypoints(*waypoint).await?),
            Commands::Heal => format_delta(&self.store.heal().await?),
        }
    }
}
