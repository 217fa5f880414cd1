//! Shared types for the devkit application.
//!
//! Holds the crate-wide `Result` alias, storage keys and the CLI subcommand
//! tree.
use std::path::PathBuf;

use clap::Subcommand;

use crate::DevkitError;

/// A specialized Result type for devkit operations.
pub type Result<T> = std::result::Result<T, DevkitError>;

/// Storage key holding the notes array.
pub const NOTES_KEY: &str = "devkit.notes";
/// Storage key holding the snippets array.
pub const SNIPPETS_KEY: &str = "devkit.snippets";
/// Storage key holding the board's task array.
pub const TASKS_KEY: &str = "devkit.tasks";
/// Storage key holding the board's column array.
pub const COLUMNS_KEY: &str = "devkit.columns";

/// Every key the application persists, in backup order.
pub const ALL_KEYS: [&str; 4] = [NOTES_KEY, SNIPPETS_KEY, TASKS_KEY, COLUMNS_KEY];

/// Summary of a backup restoration operation
#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
    /// Path to the backup file that was restored
    pub backup_file: PathBuf,
    /// Storage keys that were written back
    pub keys_restored: Vec<String>,
    /// Archive entries that were not recognised
    pub entries_skipped: Vec<String>,
}

/// Available subcommands for the devkit application
#[derive(Subcommand)]
pub enum Commands {
    /// Manage rich-text notes
    #[clap(subcommand)]
    Note(NoteCommand),

    /// Manage code snippets
    #[clap(subcommand)]
    Snippet(SnippetCommand),

    /// Work with the task board
    #[clap(subcommand)]
    Board(BoardCommand),

    /// Create a backup of all stored data
    Backup {
        /// Directory for the backup file (default uses config setting)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore stored data from a backup
    Restore {
        /// Path to the backup file
        backup_file: PathBuf,
    },

    /// Run one of the text tools
    #[clap(subcommand)]
    Tool(ToolCommand),
}

#[derive(Subcommand)]
pub enum NoteCommand {
    /// List notes, newest first
    List {
        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show a single note
    View { id: String },

    /// Create a new note
    Create {
        #[clap(short = 'T', long)]
        title: String,

        /// HTML body of the note
        #[clap(short, long, default_value = "")]
        content: String,
    },

    /// Edit an existing note
    Edit {
        id: String,

        #[clap(short = 'T', long)]
        title: Option<String>,

        #[clap(short, long)]
        content: Option<String>,
    },

    /// Delete a note by ID
    Delete { id: String },

    /// Search notes by title or content
    Search { query: String },
}

#[derive(Subcommand)]
pub enum SnippetCommand {
    /// List snippets, newest first
    List {
        /// Only show snippets carrying this tag
        #[clap(short, long)]
        tag: Option<String>,

        #[clap(short, long)]
        json: bool,
    },

    /// Show a single snippet
    View { id: String },

    /// Create a new snippet
    Create {
        #[clap(short = 'T', long)]
        title: String,

        /// Source code of the snippet
        #[clap(short, long, default_value = "")]
        code: String,

        #[clap(short, long, default_value = "plaintext")]
        language: String,

        #[clap(short, long, default_value = "")]
        description: String,

        /// Tags (comma-separated)
        #[clap(short, long)]
        tags: Option<String>,
    },

    /// Edit an existing snippet
    Edit {
        id: String,

        #[clap(short = 'T', long)]
        title: Option<String>,

        #[clap(short, long)]
        code: Option<String>,

        #[clap(short, long)]
        language: Option<String>,

        #[clap(short, long)]
        description: Option<String>,

        /// Replace the tag set (comma-separated)
        #[clap(short, long)]
        tags: Option<String>,
    },

    /// Delete a snippet by ID
    Delete { id: String },

    /// Search snippets by title or code
    Search { query: String },
}

#[derive(Subcommand)]
pub enum BoardCommand {
    /// Print the board column by column
    Show,

    /// Add a column
    AddColumn {
        title: String,

        #[clap(short, long, default_value = "bg-gray-100")]
        color: String,
    },

    /// Delete a column and every task in it
    DeleteColumn { id: String },

    /// Add a task
    AddTask {
        title: String,

        /// Column the task starts in
        #[clap(short, long, default_value = "todo")]
        status: String,

        #[clap(short, long, default_value = "")]
        description: String,

        #[clap(short, long, value_parser = ["low", "medium", "high"], default_value = "medium")]
        priority: String,

        /// Tags (comma-separated)
        #[clap(short, long)]
        tags: Option<String>,
    },

    /// Move a task into another column
    Move { id: String, column: String },

    /// Drag a task over another task or column, as the board UI does
    Drag { id: String, over: String },

    /// Delete a task
    DeleteTask { id: String },
}

#[derive(Subcommand)]
pub enum ToolCommand {
    /// Pretty-print JSON
    FormatJson {
        input: String,

        #[clap(short, long, default_value_t = 2)]
        indent: usize,
    },

    /// Minify JSON
    MinifyJson { input: String },

    /// Base64-encode text
    Base64Encode { input: String },

    /// Base64-decode text
    Base64Decode { input: String },

    /// SHA-256 digest of text, hex encoded
    Sha256 { input: String },

    /// Render markdown as HTML
    Markdown { input: String },
}
