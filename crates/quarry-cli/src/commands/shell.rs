//! Shell command - a line-oriented loop over index and search.
//!
//! ```text
//! index <db> <file_or_dir>
//! search <db> <query>
//! q
//! ```
//!
//! Each store named on a line is opened once and kept open until the loop
//! ends.

use super::{index, search};
use crate::app::App;
use quarry_core::Config;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::error;

#[derive(Debug, PartialEq)]
enum Line {
    Index { db: PathBuf, path: PathBuf },
    Search { db: PathBuf, query: String },
    Quit,
    Empty,
    Invalid(String),
}

fn parse_line(line: &str) -> Line {
    let line = line.trim();
    let (command, rest) = split_word(line);
    match command {
        "" => Line::Empty,
        "q" | "quit" | "exit" => Line::Quit,
        "index" | "search" => {
            let (db, arg) = split_word(rest);
            if db.is_empty() || arg.is_empty() {
                return Line::Invalid(format!("usage: {} <db> <{}>", command, argument_name(command)));
            }
            if command == "index" {
                Line::Index {
                    db: PathBuf::from(db),
                    path: PathBuf::from(arg),
                }
            } else {
                Line::Search {
                    db: PathBuf::from(db),
                    query: arg.to_string(),
                }
            }
        }
        other => Line::Invalid(format!("unknown command '{}'", other)),
    }
}

fn argument_name(command: &str) -> &'static str {
    if command == "index" {
        "file_or_dir"
    } else {
        "query"
    }
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Run the shell command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let mut apps: HashMap<PathBuf, App> = HashMap::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };

        let (db, action) = match parse_line(&line?) {
            Line::Quit => break,
            Line::Empty => continue,
            Line::Invalid(message) => {
                eprintln!("{}", message);
                continue;
            }
            Line::Index { db, path } => (db, Action::Index(path)),
            Line::Search { db, query } => (db, Action::Search(query)),
        };

        if !apps.contains_key(&db) {
            match App::new(config.clone(), Some(db.clone())) {
                Ok(app) => {
                    apps.insert(db.clone(), app);
                }
                Err(e) => {
                    error!(db = %db.display(), error = %e, "Failed to open store");
                    continue;
                }
            }
        }
        let Some(app) = apps.get(&db) else {
            continue;
        };

        let result = match action {
            Action::Index(path) => index::index_into(app, &path),
            Action::Search(query) => search::search_in(app, &query, false),
        };
        if let Err(e) = result {
            error!(error = %e, "Command failed");
        }
    }

    for app in apps.values() {
        app.save()?;
    }
    Ok(())
}

enum Action {
    Index(PathBuf),
    Search(String),
}
