//! Command-name contract used for log spans.

use crate::cli::parse::Commands;

/// Command name string for logging (e.g. "create", "sync").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Create { .. } => "create",
        Commands::Update { .. } => "update",
        Commands::Remove { .. } => "remove",
        Commands::Move { .. } => "move",
        Commands::List { .. } => "list",
        Commands::Show { .. } => "show",
        Commands::Sync { .. } => "sync",
        Commands::Heal => "heal",
    }
}

/// Whether the command can change the tree.
pub fn is_mutating(command: &Commands) -> bool {
    !matches!(command, Commands::List { .. } | Commands::Show { .. })
}
