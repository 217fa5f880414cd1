//! CLI module for the devkit application
//!
//! Dispatches parsed commands to the stores, the board and the text tools,
//! and prints the results.
use std::{path::PathBuf, sync::Arc};

use console::style;
use log::{debug, info};

use crate::{
    content_preview, create_backup, ids::SystemClock, parse_tag_set, parse_tags, restore_backup,
    tools, Board, BoardCommand, Commands, Config, DevkitError, KeyValueStore, Note, NoteCommand,
    NoteDraft, NotePatch, NoteStore, Priority, Result, Snippet, SnippetCommand, SnippetDraft,
    SnippetPatch, SnippetStore, TaskDraft, ToolCommand,
};

/// CLI Application handler - processes CLI commands against the storage port
pub struct App {
    /// Application configuration
    config: Config,

    port: Arc<dyn KeyValueStore>,

    notes: NoteStore,

    snippets: SnippetStore,
}

impl App {
    /// Create a new CLI application on top of `port`
    pub fn new(port: Arc<dyn KeyValueStore>, config: Config) -> Self {
        Self {
            notes: NoteStore::new(Arc::clone(&port)),
            snippets: SnippetStore::new(Arc::clone(&port)),
            port,
            config,
        }
    }

    /// Run the CLI application with the given command
    pub fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Note(command) => self.handle_note(command),
            Commands::Snippet(command) => self.handle_snippet(command),
            Commands::Board(command) => self.handle_board(command),
            Commands::Backup { output } => self.handle_backup(output),
            Commands::Restore { backup_file } => {
                let summary = restore_backup(self.port.as_ref(), &backup_file)?;
                println!(
                    "Restored {} from {}",
                    summary.keys_restored.join(", "),
                    summary.backup_file.display()
                );
                if !summary.entries_skipped.is_empty() {
                    println!("Skipped: {}", summary.entries_skipped.join(", "));
                }
                Ok(())
            }
            Commands::Tool(command) => self.handle_tool(command),
        }
    }

    fn handle_note(&self, command: NoteCommand) -> Result<()> {
        match command {
            NoteCommand::List { json } => {
                let notes = self.notes.list_all();
                if json {
                    println!("{}", serde_json::to_string_pretty(&notes)?);
                } else {
                    self.display_notes(&notes);
                }
            }
            NoteCommand::View { id } => {
                let note = self
                    .notes
                    .get(&id)
                    .ok_or(DevkitError::RecordNotFound { id })?;
                println!("{}", style(&note.title).bold());
                println!(
                    "ID: {} | Created: {} | Updated: {}",
                    note.id,
                    note.created_at.format("%Y-%m-%d %H:%M"),
                    note.updated_at.format("%Y-%m-%d %H:%M")
                );
                println!("\n{}", note.content);
            }
            NoteCommand::Create { title, content } => {
                let note = self.notes.create(NoteDraft::new(title, content))?;
                println!("Note created with ID: {}", note.id);
            }
            NoteCommand::Edit { id, title, content } => {
                let patch = NotePatch { title, content };
                match self.notes.update(&id, patch)? {
                    Some(note) => println!("Note {} updated successfully", note.id),
                    None => return Err(DevkitError::RecordNotFound { id }),
                }
            }
            NoteCommand::Delete { id } => {
                if !self.notes.delete(&id)? {
                    return Err(DevkitError::RecordNotFound { id });
                }
                println!("Note {} has been deleted.", id);
            }
            NoteCommand::Search { query } => {
                let results = self.notes.search(&query);
                if results.is_empty() {
                    println!("No notes found matching query: \"{}\"", query);
                } else {
                    self.display_notes(&results);
                }
            }
        }
        Ok(())
    }

    fn display_notes(&self, notes: &[Note]) {
        if notes.is_empty() {
            println!("No notes yet.");
            return;
        }
        for note in notes {
            println!(
                "{}  {}  {}",
                style(&note.id).dim(),
                style(&note.title).bold(),
                content_preview(&note.content, 60)
            );
        }
        println!(
            "\n{} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
    }

    fn handle_snippet(&self, command: SnippetCommand) -> Result<()> {
        match command {
            SnippetCommand::List { tag, json } => {
                let snippets = match tag {
                    Some(tag) => self.snippets.with_tag(&tag),
                    None => self.snippets.list_all(),
                };
                if json {
                    println!("{}", serde_json::to_string_pretty(&snippets)?);
                } else {
                    self.display_snippets(&snippets);
                }
            }
            SnippetCommand::View { id } => {
                let snippet = self
                    .snippets
                    .get(&id)
                    .ok_or(DevkitError::RecordNotFound { id })?;
                println!(
                    "{} [{}]",
                    style(&snippet.title).bold(),
                    style(&snippet.language).cyan()
                );
                if !snippet.description.is_empty() {
                    println!("{}", snippet.description);
                }
                println!("\n{}", snippet.code);
            }
            SnippetCommand::Create {
                title,
                code,
                language,
                description,
                tags,
            } => {
                let snippet = self.snippets.create(SnippetDraft {
                    title,
                    code,
                    language,
                    description,
                    tags: parse_tag_set(tags),
                })?;
                println!("Snippet created with ID: {}", snippet.id);
            }
            SnippetCommand::Edit {
                id,
                title,
                code,
                language,
                description,
                tags,
            } => {
                let patch = SnippetPatch {
                    title,
                    code,
                    language,
                    description,
                    tags: tags.map(|t| parse_tag_set(Some(t))),
                };
                match self.snippets.update(&id, patch)? {
                    Some(snippet) => println!("Snippet {} updated successfully", snippet.id),
                    None => return Err(DevkitError::RecordNotFound { id }),
                }
            }
            SnippetCommand::Delete { id } => {
                if !self.snippets.delete(&id)? {
                    return Err(DevkitError::RecordNotFound { id });
                }
                println!("Snippet {} has been deleted.", id);
            }
            SnippetCommand::Search { query } => {
                let results = self.snippets.search(&query);
                if results.is_empty() {
                    println!("No snippets found matching query: \"{}\"", query);
                } else {
                    self.display_snippets(&results);
                }
            }
        }
        Ok(())
    }

    fn display_snippets(&self, snippets: &[Snippet]) {
        if snippets.is_empty() {
            println!("No snippets yet.");
            return;
        }
        for snippet in snippets {
            let tags = snippet
                .tags
                .iter()
                .map(|tag| format!("#{}", tag))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "{}  {} [{}] {}",
                style(&snippet.id).dim(),
                style(&snippet.title).bold(),
                snippet.language,
                style(tags).cyan()
            );
        }
    }

    fn handle_board(&self, command: BoardCommand) -> Result<()> {
        let mut board = Board::load(Arc::clone(&self.port));
        match command {
            BoardCommand::Show => self.display_board(&board),
            BoardCommand::AddColumn { title, color } => {
                let column = board.add_column(&title, &color)?;
                println!("Column '{}' added with ID: {}", column.title, column.id);
            }
            BoardCommand::DeleteColumn { id } => {
                let doomed = board.tasks_in(&id).len();
                if !board.delete_column(&id)? {
                    return Err(DevkitError::ColumnNotFound { id });
                }
                println!("Column {} deleted along with {} tasks.", id, doomed);
            }
            BoardCommand::AddTask {
                title,
                status,
                description,
                priority,
                tags,
            } => {
                let priority: Priority = priority.parse()?;
                let task = board.add_task(TaskDraft {
                    description,
                    priority,
                    tags: parse_tags(tags),
                    ..TaskDraft::new(title, status)
                })?;
                println!("Task created with ID: {}", task.id);
            }
            BoardCommand::Move { id, column } => {
                if board.task(&id).is_none() {
                    return Err(DevkitError::TaskNotFound { id });
                }
                if board.column(&column).is_none() {
                    return Err(DevkitError::ColumnNotFound { id: column });
                }
                if board.move_task(&id, &column)? {
                    println!("Task {} moved to {}", id, column);
                } else {
                    println!("Task {} is already in {}", id, column);
                }
            }
            BoardCommand::Drag { id, over } => {
                if !board.drag_start(&id) {
                    return Err(DevkitError::TaskNotFound { id });
                }
                let changed = match board.resolve_target(&over) {
                    Some(target) => board.drag_over(&target)?,
                    None => {
                        debug!("Drop target {} is neither a task nor a column", over);
                        false
                    }
                };
                board.drag_end();
                if changed {
                    println!("Task {} dropped on {}", id, over);
                } else {
                    println!("Nothing to do");
                }
            }
            BoardCommand::DeleteTask { id } => {
                if !board.delete_task(&id)? {
                    return Err(DevkitError::TaskNotFound { id });
                }
                println!("Task {} has been deleted.", id);
            }
        }
        Ok(())
    }

    fn display_board(&self, board: &Board) {
        for column in board.columns() {
            let tasks = board.tasks_in(&column.id);
            println!(
                "{} {}",
                style(&column.title).bold().underlined(),
                style(format!("({}) [{}]", tasks.len(), column.id)).dim()
            );
            for task in tasks {
                let priority = match task.priority {
                    Priority::High => style(task.priority.to_string()).red(),
                    Priority::Medium => style(task.priority.to_string()).yellow(),
                    Priority::Low => style(task.priority.to_string()).green(),
                };
                let due = task
                    .end_date
                    .map(|d| format!(" due {}", d))
                    .unwrap_or_default();
                println!(
                    "  {} {} [{}]{}",
                    style(&task.id).dim(),
                    task.title,
                    priority,
                    due
                );
            }
            println!();
        }
    }

    fn handle_backup(&self, output: Option<PathBuf>) -> Result<()> {
        let dir = output.unwrap_or_else(|| self.config.backup_dir.clone());
        let path = create_backup(
            self.port.as_ref(),
            &SystemClock,
            &dir,
            self.config.max_backups,
        )?;
        info!("Backup written to {}", path.display());
        println!("Backup created at {}", path.display());
        Ok(())
    }

    fn handle_tool(&self, command: ToolCommand) -> Result<()> {
        let output = match command {
            ToolCommand::FormatJson { input, indent } => tools::format_json(&input, indent),
            ToolCommand::MinifyJson { input } => tools::minify_json(&input),
            ToolCommand::Base64Encode { input } => Ok(tools::base64_encode(&input)),
            ToolCommand::Base64Decode { input } => tools::base64_decode(&input),
            ToolCommand::Sha256 { input } => Ok(tools::sha256_hex(&input)),
            ToolCommand::Markdown { input } => Ok(tools::markdown_to_html(&input)),
        };
        match output {
            Ok(output) => println!("{}", output),
            // validation problems are shown, not propagated
            Err(e) => eprintln!("{}", style(e).red()),
        }
        Ok(())
    }
}
