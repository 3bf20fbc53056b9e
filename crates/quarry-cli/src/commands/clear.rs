//! Clear command - remove all documents from the store.

use crate::app::App;
use quarry_core::Config;
use std::io::{self, Write};
use std::path::PathBuf;

/// Run the clear command.
pub fn run(config: Config, db: Option<PathBuf>, skip_confirm: bool) -> anyhow::Result<()> {
    let app = App::new(config, db)?;

    if app.store.document_count() == 0 {
        println!("Store is empty. Nothing to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!(
            "This will delete all {} documents. Are you sure? [y/N] ",
            app.store.document_count()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    app.store.clear();
    app.save()?;
    println!("Store cleared.");

    Ok(())
}
