//! Command-line argument parsing.
//!
//! `depot <name> [<good> <qty>]...` — a depot name followed by zero or more
//! alternating good/quantity pairs describing the starting inventory.

use std::collections::HashMap;

use clap::Parser;

use crate::codec::is_valid_token;
use crate::error::StartupError;

/// Parsed and validated command-line arguments.
#[derive(Parser)]
#[command(name = "depot", about = "A peer-to-peer inventory depot node")]
struct Args {
    /// This depot's name.
    name: String,
    /// Alternating good/quantity pairs describing starting inventory.
    #[arg(value_name = "GOOD QTY", allow_hyphen_values = true)]
    resources: Vec<String>,
}

/// This depot's validated startup configuration.
pub struct Startup {
    pub name: String,
    pub initial_inventory: HashMap<String, i64>,
}

/// Parses `argv`, then validates the depot name and every starting quantity
/// per §6. `clap` handles `--help`/`--version` and the bare "no name given"
/// usage failure (exit code 1) on its own; everything past that is
/// hand-written validation mapping to exit codes 2 and 3.
pub fn parse() -> Result<Startup, StartupError> {
    let args = Args::try_parse().map_err(|_| StartupError::Usage)?;
    validate(args.name, args.resources)
}

fn validate(name: String, resources: Vec<String>) -> Result<Startup, StartupError> {
    if !is_valid_token(&name) {
        return Err(StartupError::InvalidName);
    }

    let mut initial_inventory = HashMap::new();
    let mut pairs = resources.chunks_exact(2);
    for pair in &mut pairs {
        let good = &pair[0];
        let qty = &pair[1];
        if !is_valid_token(good) {
            return Err(StartupError::InvalidName);
        }
        let qty: i64 = qty.parse().map_err(|_| StartupError::InvalidQuantity)?;
        if qty < 0 {
            return Err(StartupError::InvalidQuantity);
        }
        initial_inventory.insert(good.clone(), qty);
    }
    // A trailing good with no paired quantity is dropped silently rather
    // than rejected, matching gather_resources's behavior of stopping at
    // the last complete pair.

    Ok(Startup {
        name,
        initial_inventory,
    })
}
