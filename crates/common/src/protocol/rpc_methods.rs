// RPC method name constants shared by the coordinator and its clients.

// ── Coordinator-internal ───────────────────────────────────────────
pub const RPC_PING: &str = "rpc.ping";

// ── Notes ──────────────────────────────────────────────────────────
pub const NOTE_CREATE: &str = "note.create";
pub const NOTE_CREATE_NAMED: &str = "note.create_named";
pub const NOTE_DELETE: &str = "note.delete";
pub const NOTE_DISPLAY: &str = "note.display";
pub const NOTE_EXISTS: &str = "note.exists";
pub const NOTE_LIST: &str = "note.list";
pub const NOTE_TITLE: &str = "note.title";
pub const NOTE_CHANGE_DATE: &str = "note.change_date";
pub const NOTE_CONTENTS: &str = "note.contents";
pub const NOTE_SET_CONTENTS: &str = "note.set_contents";
pub const NOTE_SEARCH: &str = "note.search";
pub const NOTE_FIND: &str = "note.find";

// ── Application ────────────────────────────────────────────────────
pub const APP_VERSION: &str = "app.version";
pub const APP_COMMANDLINE: &str = "app.commandline";
pub const APP_COMMAND: &str = "app.command";
pub const APP_DISPLAY_SEARCH: &str = "app.display_search";
pub const APP_QUIT: &str = "app.quit";

/// All methods the coordinator dispatches.
pub const IMPLEMENTED_METHODS: &[&str] = &[
    RPC_PING,
    NOTE_CREATE,
    NOTE_CREATE_NAMED,
    NOTE_DELETE,
    NOTE_DISPLAY,
    NOTE_EXISTS,
    NOTE_LIST,
    NOTE_TITLE,
    NOTE_CHANGE_DATE,
    NOTE_CONTENTS,
    NOTE_SET_CONTENTS,
    NOTE_SEARCH,
    NOTE_FIND,
    APP_VERSION,
    APP_COMMANDLINE,
    APP_COMMAND,
    APP_DISPLAY_SEARCH,
    APP_QUIT,
];
