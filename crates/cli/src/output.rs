//! Output formatting for CLI

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vaultbridge_common::{FileHandle, VaultRegistryEntry};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            table.add_row(item.row());

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(item).unwrap_or_default());
        }
        OutputFormat::Plain => {
            let row = item.row();
            for (header, value) in T::headers().iter().zip(row.iter()) {
                println!("{}: {}", header, value);
            }
        }
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            _ => println!("No items found."),
        }
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print a simple message
pub fn print_message(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "message": message }));
        }
        _ => {
            println!("{}", message);
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Milliseconds since the epoch as a UTC timestamp
pub fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Registry entry with its id
#[derive(Serialize)]
pub struct VaultDisplay {
    pub id: String,
    pub path: String,
    pub ts: i64,
    pub open: bool,
}

impl From<(String, VaultRegistryEntry)> for VaultDisplay {
    fn from((id, entry): (String, VaultRegistryEntry)) -> Self {
        Self {
            id,
            path: entry.path,
            ts: entry.ts,
            open: entry.open.unwrap_or(false),
        }
    }
}

impl TableDisplay for VaultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Path", "Registered", "Open"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.path.clone(),
            format_millis(self.ts),
            if self.open { "yes" } else { "no" }.to_string(),
        ]
    }
}

impl TableDisplay for FileHandle {
    fn headers() -> Vec<&'static str> {
        vec!["Path", "Name", "Size", "Modified"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.path.clone(),
            self.name.clone(),
            format!("{}B", self.stat.size),
            format_millis(self.stat.mtime),
        ]
    }
}

/// One resolved outgoing link
#[derive(Serialize)]
pub struct LinkDisplay {
    pub target: String,
    pub count: u32,
}

impl TableDisplay for LinkDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Target", "Count"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.target.clone(), self.count.to_string()]
    }
}
