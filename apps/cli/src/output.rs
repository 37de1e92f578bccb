//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;
use shelf_store::Bookmark;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"status": "success", "message": message})
            );
        }
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => {
            eprintln!(
                "{}",
                serde_json::json!({"status": "error", "message": message})
            );
        }
    }
}

/// Print a labelled row.
pub fn print_row(label: &str, value: &str) {
    println!("{:<10}{}", format!("{}:", label), value);
}

/// Print a divider line.
pub fn print_divider() {
    println!("{}", "-".repeat(50));
}

/// Print a heading.
pub fn print_heading(text: &str) {
    println!("\n{}", text);
    print_divider();
}

/// One text line per bookmark: id, title, url, local creation time.
pub fn bookmark_line(bookmark: &Bookmark) -> String {
    let created = bookmark
        .created_at
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M");
    format!(
        "{:<8} {}  {}  ({})",
        bookmark.id, bookmark.title, bookmark.url, created
    )
}

pub fn print_bookmarks(bookmarks: &[Bookmark], format: &OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&bookmarks),
        OutputFormat::Text => {
            print_heading(&format!("Bookmarks ({})", bookmarks.len()));
            if bookmarks.is_empty() {
                println!("No bookmarks yet. Add one with `shelf add <title> <url>`.");
            }
            for bookmark in bookmarks {
                println!("{}", bookmark_line(bookmark));
            }
        }
    }
}
