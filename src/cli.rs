use clap::{Parser, Subcommand};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Checkpoint layer over a git repository, driven manually or by agents.
#[derive(Debug, Parser)]
#[command(name = "stem", version = VERSION, about = "Branch-and-leaf checkpoints on top of git")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize checkpointing in the current repository
    Create {
        /// Also set up the agent queue and live note files
        #[arg(long)]
        agent: bool,
        /// Reset an existing setup, discarding recorded checkpoints
        #[arg(long)]
        force: bool,
    },
    /// Open a new branch from the current tree
    Branch {
        /// What this line of work is about
        prompt: String,
        /// Longer description; defaults to the prompt
        #[arg(long)]
        summary: Option<String>,
    },
    /// Snapshot the current work as a leaf on the current branch
    Update {
        /// Describes the work being checkpointed
        prompt: String,
        /// Longer description; defaults to the prompt
        #[arg(long)]
        summary: Option<String>,
        /// Close the current branch with this final leaf prompt, then open
        /// a new branch described by PROMPT
        #[arg(long = "final", value_name = "LEAF_PROMPT")]
        final_prompt: Option<String>,
    },
    /// Move the working tree to a branch head or a specific leaf
    Jump {
        /// Branch id, leaf id, or bare identifier to resolve
        target: String,
        /// Leaf id scoped to TARGET (which must then be a branch id)
        leaf_id: Option<String>,
        /// Treat TARGET as a branch id
        #[arg(long, conflicts_with = "leaf")]
        head: bool,
        /// Treat TARGET as a leaf id
        #[arg(long, conflicts_with = "head")]
        leaf: bool,
    },
    /// Drain pending agent commands once
    Exec,
    /// Poll for agent commands
    Watch {
        /// Seconds between cycles
        #[arg(long, default_value_t = 3)]
        interval: u64,
        /// Run detached in the background
        #[arg(long, conflicts_with = "stop")]
        daemon: bool,
        /// Stop a background watcher
        #[arg(long)]
        stop: bool,
    },
    /// Show the current branch, recent leaves and watcher liveness
    Status,
    /// List branches and their recent leaves
    List {
        /// Number of branches to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Number of leaves to show per branch
        #[arg(long, default_value_t = 3)]
        leaves: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn jump_modes_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["stem", "jump", "b0001", "--head", "--leaf"]).is_err());
        assert!(Cli::try_parse_from(["stem", "jump", "001a", "--leaf"]).is_ok());
    }

    #[test]
    fn update_final_takes_leaf_prompt() {
        let cli =
            Cli::try_parse_from(["stem", "update", "--final", "done auth", "next topic"]).unwrap();
        match cli.command {
            Commands::Update {
                prompt,
                final_prompt,
                ..
            } => {
                assert_eq!(prompt, "next topic");
                assert_eq!(final_prompt.as_deref(), Some("done auth"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
