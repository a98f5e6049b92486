use std::collections::BTreeSet;

use puzzlesync::prelude::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Puzzle types
// ---------------------------------------------------------------------------

/// Which cubes on the table are lit. Sorted so every client renders the
/// same order.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Table {
    highlighted: BTreeSet<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TableOp {
    /// Light an unlit cube or unlight a lit one.
    ToggleCube { cube_id: String },
    /// Unlight everything.
    Reset,
    /// Light a batch of cubes at once.
    Reveal { cube_ids: Vec<String> },
}

// ---------------------------------------------------------------------------
// Puzzle logic
// ---------------------------------------------------------------------------

struct CubeTable;

impl PuzzleLogic for CubeTable {
    type Document = Table;
    type Operation = TableOp;

    fn initial_document() -> Table {
        Table::default()
    }

    fn required_role(op: &TableOp) -> Role {
        match op {
            TableOp::ToggleCube { .. } => Role::Player,
            TableOp::Reset | TableOp::Reveal { .. } => Role::DungeonMaster,
        }
    }

    fn apply(table: &Table, op: TableOp) -> Result<Table, String> {
        let mut next = table.clone();
        match op {
            TableOp::ToggleCube { cube_id } => {
                let cube_id = cube_id_of(&cube_id)?;
                if !next.highlighted.remove(&cube_id) {
                    next.highlighted.insert(cube_id);
                }
            }
            TableOp::Reset => next.highlighted.clear(),
            TableOp::Reveal { cube_ids } => {
                for id in cube_ids {
                    next.highlighted.insert(cube_id_of(&id)?);
                }
            }
        }
        Ok(next)
    }
}

fn cube_id_of(raw: &str) -> Result<String, String> {
    let id = raw.trim();
    if id.is_empty() {
        return Err("cube_id must not be empty".into());
    }
    Ok(id.to_string())
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    tracing::info!(bind = %config.bind_addr, "starting cube table");

    let server = PuzzleServerBuilder::from_config(config)
        .build::<CubeTable>()
        .await?;

    server.run().await?;
    Ok(())
}
