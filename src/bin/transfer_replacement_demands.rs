// Small ops utility: re-run demand transfer for every configured replacement edge.
//
// Usage:
//   cargo run --bin transfer_replacement_demands -- [db_path]
//
// Intended to be invoked by an external scheduler or an operator as a
// reconciliation sweep for demand rows that were persisted before their
// replacement mapping was configured. The engine itself never runs this
// in the background.

use okuc_dualstock::app::{get_default_db_path, EngineState};
use okuc_dualstock::i18n::t_with_args;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    okuc_dualstock::logging::init();

    let db_path = std::env::args().nth(1).unwrap_or_else(get_default_db_path);

    let state = EngineState::new(&db_path)?;

    let mappings = state.replacement_resolver.list_mappings()?;
    if mappings.is_empty() {
        println!("no replacement mappings configured");
        return Ok(());
    }

    let (rows, articles) = state.replacement_resolver.transfer_all()?;

    println!(
        "{} (articles={})",
        t_with_args("replacement.transferred", &[("count", &rows.to_string())]),
        articles
    );
    Ok(())
}
