//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use worklog_core::{partition, BoardItem, Column, ColumnRevisions};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Pretty-print any serializable value
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to encode JSON output: {}", e),
        }
    }

    /// Print a single item (with notes and documents)
    pub fn print_item(&self, item: &BoardItem) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", item.id);
                println!("Title:       {}", item.title);
                println!("Column:      {} (#{})", item.column.title(), item.position + 1);
                if let Some(ref key) = item.issue_key {
                    println!("Issue:       {}", key);
                }
                if let Some(ref url) = item.issue_url {
                    println!("URL:         {}", url);
                }
                if let Some(ref desc) = item.description {
                    println!("Description: {}", truncate_line(desc, 60));
                }
                println!("Created:     {}", item.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:     {}", item.updated_at.format("%Y-%m-%d %H:%M"));

                if !item.notes.is_empty() {
                    println!();
                    println!("── Notes ({}) ──", item.notes.len());
                    for note in &item.notes {
                        println!(
                            "{} [{}] {}",
                            short_id(&note.id),
                            note.created_at.format("%Y-%m-%d"),
                            truncate_line(&note.body, 60)
                        );
                    }
                }

                if !item.documents.is_empty() {
                    println!();
                    println!("── Documents ({}) ──", item.documents.len());
                    for doc in &item.documents {
                        println!(
                            "{} {} - {}",
                            short_id(&doc.id),
                            truncate(&doc.title, 30),
                            truncate(&doc.location, 45)
                        );
                    }
                }
            }
            OutputFormat::Json => self.print_json(item),
            OutputFormat::Quiet => {
                println!("{}", item.id);
            }
        }
    }

    /// Print the board column by column
    pub fn print_board(&self, items: &[BoardItem], revisions: &ColumnRevisions) {
        match self.format {
            OutputFormat::Human => {
                for (i, column) in Column::ALL.iter().enumerate() {
                    let members = partition(items, *column);
                    if i > 0 {
                        println!();
                    }
                    println!(
                        "── {} ({}) rev {} ──",
                        column.title(),
                        members.len(),
                        revisions.get(column).copied().unwrap_or(0)
                    );
                    if members.is_empty() {
                        println!("   (empty)");
                    }
                    for item in &members {
                        let issue = item
                            .issue_key
                            .as_deref()
                            .map(|key| format!(" [{}]", key))
                            .unwrap_or_default();
                        println!(
                            "{:>2}. {} | {}{}",
                            item.position,
                            short_id(&item.id),
                            truncate(&item.title, 45),
                            issue
                        );
                    }
                }
                println!("\n{} item(s)", items.len());
            }
            OutputFormat::Json => self.print_json(&serde_json::json!({
                "items": items,
                "revisions": revisions,
            })),
            OutputFormat::Quiet => {
                for column in Column::ALL {
                    for item in partition(items, column) {
                        println!("{}", item.id);
                    }
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// First eight characters of an id
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Truncate a string to max length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
pub fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ünïcödé wörds here", 8), "ünïcö...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(
            truncate_line("very long single line here", 10),
            "very lo..."
        );
    }

    #[test]
    fn test_short_id() {
        let id = uuid::Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(short_id(&id), "67e55044");
    }
}
