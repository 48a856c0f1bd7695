// Window geometry per note URI, persisted as `<uri> <w> <h> <x> <y>` lines.
//
// Loaded once at startup and written once at shutdown. Lines that do not
// parse are dropped.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::write_atomic;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32, x: u32, y: u32) -> Self {
        Self { width, height, x, y }
    }

    /// `<w> <h> <x> <y>`; negative values are taken by magnitude.
    fn parse_fields<'a>(mut fields: impl Iterator<Item = &'a str>) -> Option<Self> {
        let mut next = || -> Option<u32> {
            let value: i64 = fields.next()?.parse().ok()?;
            u32::try_from(value.unsigned_abs()).ok()
        };
        Some(Self { width: next()?, height: next()?, x: next()?, y: next()? })
    }
}

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    records: BTreeMap<String, Geometry>,
}

impl MetadataStore {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), records: BTreeMap::new() }
    }

    /// Read `path`. A missing file is an empty store; unreadable contents are
    /// logged and treated the same way.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(path);
        match fs::read(&store.path) {
            Ok(bytes) => {
                store.records = parse_records(&String::from_utf8_lossy(&bytes));
                debug!(path = %store.path.display(), count = store.records.len(), "loaded metadata");
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(path = %store.path.display(), %error, "failed to read metadata, starting empty");
            }
        }
        store
    }

    /// Overwrite the file with every record.
    pub fn save(&self) -> Result<()> {
        let mut out = String::new();
        for (uri, geometry) in &self.records {
            out.push_str(&format!(
                "{uri} {} {} {} {}\n",
                geometry.width, geometry.height, geometry.x, geometry.y
            ));
        }
        write_atomic(&self.path, out.as_bytes())
            .with_context(|| format!("failed to write metadata `{}`", self.path.display()))
    }

    pub fn record_geometry(&mut self, uri: &str, geometry: Geometry) {
        self.records.insert(uri.to_string(), geometry);
    }

    pub fn geometry_for(&self, uri: &str) -> Option<Geometry> {
        self.records.get(uri).copied()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

fn parse_records(text: &str) -> BTreeMap<String, Geometry> {
    let mut records = BTreeMap::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [uri, rest @ ..] = fields.as_slice() else {
            continue;
        };
        if rest.len() != 4 {
            continue;
        }
        if let Some(geometry) = Geometry::parse_fields(rest.iter().copied()) {
            records.insert((*uri).to_string(), geometry);
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const A: &str = "note://kzrnote/0b7f4f36-6a4f-4d3c-9a53-1f1d1b1c1d1e";
    const B: &str = "note://kzrnote/9e1c3a52-0c1d-4a43-8d0e-5b7a9f1c2d3e";

    #[test]
    fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = MetadataStore::load(tmp.path().join("metadata"));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata");
        let mut store = MetadataStore::empty(&path);
        store.record_geometry(A, Geometry::new(640, 480, 10, 20));
        store.record_geometry(B, Geometry::new(300, 200, 0, 0));
        store.save().unwrap();

        let loaded = MetadataStore::load(&path);
        assert_eq!(loaded.geometry_for(A), Some(Geometry::new(640, 480, 10, 20)));
        assert_eq!(loaded.geometry_for(B), Some(Geometry::new(300, 200, 0, 0)));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata");
        fs::write(
            &path,
            format!(
                "{A} 640 480 10 20\n\
                 garbage\n\
                 {B} 1 2 3\n\
                 {B} 1 2 3 4 5\n\
                 {B} one 2 3 4\n\
                 \n"
            ),
        )
        .unwrap();

        let store = MetadataStore::load(&path);
        assert_eq!(store.len(), 1);
        assert_eq!(store.geometry_for(A), Some(Geometry::new(640, 480, 10, 20)));
        assert_eq!(store.geometry_for(B), None);
    }

    #[test]
    fn negative_values_are_taken_by_magnitude() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata");
        fs::write(&path, format!("{A} -640 480 -5 7\n")).unwrap();

        let store = MetadataStore::load(&path);
        assert_eq!(store.geometry_for(A), Some(Geometry::new(640, 480, 5, 7)));
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata");
        fs::write(&path, format!("{B} 1 1 1 1\nstale junk line\n")).unwrap();

        let mut store = MetadataStore::empty(&path);
        store.record_geometry(A, Geometry::new(2, 2, 2, 2));
        store.save().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{A} 2 2 2 2\n"));
    }

    #[test]
    fn recording_replaces_previous_geometry() {
        let mut store = MetadataStore::empty("/unused");
        store.record_geometry(A, Geometry::new(1, 1, 1, 1));
        store.record_geometry(A, Geometry::new(9, 9, 9, 9));
        assert_eq!(store.geometry_for(A), Some(Geometry::new(9, 9, 9, 9)));
        assert_eq!(store.len(), 1);
    }
}
