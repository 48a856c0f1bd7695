// kzrnote-common: shared types and rules for the kzrnote coordinator and its clients

pub mod note;
pub mod paths;
pub mod protocol;

/// Application name; also the URI authority and the directory name under
/// every XDG root.
pub const APP_NAME: &str = "kzrnote";

/// Version string reported by `app.version`.
pub fn version_string() -> String {
    format!("{APP_NAME} {}", env!("CARGO_PKG_VERSION"))
}
