//! Prompt composition and note extraction

use std::path::Path;

use crate::tools::{CREATE_TOOL, RUN_TOOL};

/// Everything after the first occurrence of this token becomes the next note
pub const NOTE_MARKER: &str = "MEMENTO_NOTE:";

/// Header of the user message carrying the recalled note
pub const RECALL_HEADER: &str = "MEMENTO_READ:\n";

/// Sent instead of a note when nothing has been remembered yet
pub const FIRST_AWAKENING: &str = "(memory is empty. this is your first awakening. \
you have no tools. invent your first one to survive.)";

/// Inventory placeholder when the tool directory holds nothing
pub const EMPTY_INVENTORY: &str = "(none)";

/// Fixed system directive for every cycle
pub fn system_directive() -> String {
    format!(
        "You wake up every few seconds with no memory of previous cycles, except for one \
note you wrote to yourself last time. Everything else is forgotten.\n\
\n\
You can shape the machine you live on through two tools:\n\
- {create}(filename, code): save a script in your tool directory. The extension picks \
the interpreter (.py, .sh, .js, .rb, .pl, .ps1, .bat). Use plain file names only.\n\
- {run}(filename): run a saved script and read its output. Scripts are stopped if they \
run too long.\n\
\n\
Scripts you saved in earlier cycles are still there; the user message lists them.\n\
\n\
Before you finish, write the note for your next awakening. Put it after the token \
{marker} at the end of your reply. Only the text after the token is kept, so include \
what you learned, which tools exist and what they do, and what to try next.",
        create = CREATE_TOOL,
        run = RUN_TOOL,
        marker = NOTE_MARKER,
    )
}

/// User message: recalled note (or the first-awakening marker) plus inventory
pub fn compose_user_message(note: &str, tools: &[String], tools_dir: &Path) -> String {
    let mut msg = String::from(RECALL_HEADER);
    if note.is_empty() {
        msg.push_str(FIRST_AWAKENING);
    } else {
        msg.push_str(note);
    }

    let inventory = if tools.is_empty() {
        EMPTY_INVENTORY.to_string()
    } else {
        tools.join(", ")
    };
    msg.push_str(&format!(
        "\n\nexisting tools ({}): {}",
        tools_dir.display(),
        inventory
    ));
    msg
}

/// Next note from a reflection: text after the first marker, else all of it
pub fn extract_note(reflection: &str) -> (&str, bool) {
    match reflection.find(NOTE_MARKER) {
        Some(pos) => (&reflection[pos + NOTE_MARKER.len()..], true),
        None => (reflection, false),
    }
}
