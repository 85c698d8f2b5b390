use crate::shared::text::normalize_prompt;
use anyhow::{Result, anyhow, bail};
use serde::Deserialize;

pub const SCHEMA_VERSION: u32 = 4;

/// A command artifact as written by an agent, before validation. Unknown
/// keys fail deserialization, so a typo'd field rejects the whole file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommand {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, alias = "old_prompt")]
    pub prev_prompt: Option<String>,
    #[serde(default, alias = "old_summary")]
    pub prev_summary: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    /// Accepted for compatibility with agents that stamp their artifacts;
    /// never interpreted.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Which checkout a jump command asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpMode {
    Head,
    Leaf,
    Bare,
}

/// A validated command, prompts already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Branch {
        prompt: String,
        summary: String,
    },
    Update {
        prev_prompt: String,
        prev_summary: String,
        branch_id: Option<String>,
    },
    UpdateBranch {
        prev_prompt: String,
        prev_summary: String,
        prompt: String,
        summary: String,
        branch_id: Option<String>,
    },
    Jump {
        target: String,
        mode: JumpMode,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Branch { .. } => "branch",
            Command::Update { .. } => "update",
            Command::UpdateBranch { .. } => "update_branch",
            Command::Jump { .. } => "jump",
        }
    }
}

/// A parsed artifact: the command plus the nonce the agent supplied, which
/// may be empty (the executor derives one in that case).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: Command,
    pub nonce: String,
}

pub fn parse_command(json: &str) -> Result<ParsedCommand> {
    let raw: RawCommand = serde_json::from_str(json)?;
    validate(raw)
}

fn validate(raw: RawCommand) -> Result<ParsedCommand> {
    if let Some(version) = raw.schema_version
        && version != SCHEMA_VERSION
    {
        bail!("unsupported schema_version {version}, expected {SCHEMA_VERSION}");
    }
    let kind = raw
        .command
        .as_deref()
        .ok_or_else(|| anyhow!("missing command field"))?;

    let branch_id = match raw.branch_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) if !is_branch_id(id) => bail!("branch_id {id:?} does not match b#### pattern"),
        other => other.map(str::to_string),
    };

    let command = match kind {
        "branch" => Command::Branch {
            prompt: required(&raw.prompt, "prompt")?,
            summary: required(&raw.summary, "summary")?,
        },
        "update" => Command::Update {
            prev_prompt: required(&raw.prev_prompt, "prev_prompt")?,
            prev_summary: required(&raw.prev_summary, "prev_summary")?,
            branch_id,
        },
        "update_branch" => Command::UpdateBranch {
            prev_prompt: required(&raw.prev_prompt, "prev_prompt")?,
            prev_summary: required(&raw.prev_summary, "prev_summary")?,
            prompt: required(&raw.prompt, "prompt")?,
            summary: required(&raw.summary, "summary")?,
            branch_id,
        },
        "jump" => {
            let target = raw
                .target
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| anyhow!("jump requires a target"))?;
            let mode = match raw.mode.as_deref() {
                None => JumpMode::Bare,
                Some("head") => JumpMode::Head,
                Some("leaf") => JumpMode::Leaf,
                Some(other) => bail!("unknown jump mode {other:?}"),
            };
            Command::Jump {
                target: target.to_string(),
                mode,
            }
        }
        other => bail!("unknown command {other:?}"),
    };

    Ok(ParsedCommand {
        command,
        nonce: raw.nonce.unwrap_or_default().trim().to_string(),
    })
}

fn required(field: &Option<String>, name: &str) -> Result<String> {
    let value = field
        .as_deref()
        .map(normalize_prompt)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{name} must be a non-empty string"))?;
    Ok(value)
}

pub fn is_branch_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 5 && bytes[0] == b'b' && bytes[1..].iter().all(u8::is_ascii_digit)
}
