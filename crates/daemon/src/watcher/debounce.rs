// Folds a burst of events on one note file into the change it amounts to.
//
// Editors save through a temp file and a rename, so one save shows up as
// remove + create + modify within a few milliseconds, and a note created
// by an external tool may be created, written and renamed away just as
// fast. What the loop needs is the net change between "before the burst"
// and "after the burst":
//
//   existed before | exists after | delivered
//   ---------------+--------------+----------
//   no             | yes          | Create
//   yes            | yes          | Modify
//   yes            | no           | Remove
//   no             | no           | nothing

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::trace;

use super::{FsEventKind, RawFsEvent};

const DEFAULT_SETTLE_MS: u64 = 100;
const MIN_SETTLE_MS: u64 = 20;
const MAX_SETTLE_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct DebounceConfig {
    /// Quiet time after the last event before a path is delivered.
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_SETTLE_MS) }
    }
}

impl DebounceConfig {
    /// Window in milliseconds, clamped to [20, 500].
    pub fn with_millis(ms: u64) -> Self {
        Self { window: Duration::from_millis(ms.clamp(MIN_SETTLE_MS, MAX_SETTLE_MS)) }
    }
}

/// One path's burst so far.
#[derive(Debug, Clone, Copy)]
struct Burst {
    /// Inferred from the first event: anything but a create means the file
    /// was already there.
    existed_before: bool,
    exists_now: bool,
    last_seen: Instant,
}

impl Burst {
    fn start(kind: FsEventKind, now: Instant) -> Self {
        Self {
            existed_before: kind != FsEventKind::Create,
            exists_now: kind != FsEventKind::Remove,
            last_seen: now,
        }
    }

    fn net_change(&self) -> Option<FsEventKind> {
        match (self.existed_before, self.exists_now) {
            (false, true) => Some(FsEventKind::Create),
            (true, true) => Some(FsEventKind::Modify),
            (true, false) => Some(FsEventKind::Remove),
            (false, false) => None,
        }
    }
}

pub struct Debouncer {
    config: DebounceConfig,
    bursts: HashMap<PathBuf, Burst>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, bursts: HashMap::new() }
    }

    pub fn push(&mut self, event: RawFsEvent) {
        self.push_at(event, Instant::now());
    }

    fn push_at(&mut self, event: RawFsEvent, now: Instant) {
        self.bursts
            .entry(event.path)
            .and_modify(|burst| {
                burst.exists_now = event.kind != FsEventKind::Remove;
                burst.last_seen = now;
            })
            .or_insert_with(|| Burst::start(event.kind, now));
    }

    /// Net changes of every burst quiet for at least one window. A file
    /// that came and went within its burst is dropped.
    pub fn drain_ready(&mut self) -> Vec<RawFsEvent> {
        self.drain_ready_at(Instant::now())
    }

    fn drain_ready_at(&mut self, now: Instant) -> Vec<RawFsEvent> {
        let window = self.config.window;
        let mut ready = Vec::new();
        self.bursts.retain(|path, burst| {
            if now.duration_since(burst.last_seen) < window {
                return true;
            }
            match burst.net_change() {
                Some(kind) => ready.push(RawFsEvent { kind, path: path.clone() }),
                None => trace!(path = %path.display(), "transient note file ignored"),
            }
            false
        });
        ready
    }

    pub fn pending_count(&self) -> usize {
        self.bursts.len()
    }

    /// When the earliest burst settles.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.bursts.values().map(|burst| burst.last_seen + self.config.window).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::FsEventKind::{Create, Modify, Remove};

    fn event(kind: FsEventKind, path: &str) -> RawFsEvent {
        RawFsEvent { kind, path: PathBuf::from(path) }
    }

    /// Push `kinds` on one path 5ms apart and return what settles.
    fn settle(kinds: &[FsEventKind]) -> Vec<RawFsEvent> {
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        let now = Instant::now();
        for (step, kind) in kinds.iter().enumerate() {
            debouncer.push_at(event(*kind, "/n/a.note"), now + Duration::from_millis(5 * step as u64));
        }
        debouncer.drain_ready_at(now + Duration::from_secs(1))
    }

    #[test]
    fn window_is_clamped() {
        assert_eq!(DebounceConfig::with_millis(1).window, Duration::from_millis(20));
        assert_eq!(DebounceConfig::with_millis(9_000).window, Duration::from_millis(500));
        assert_eq!(DebounceConfig::with_millis(150).window, Duration::from_millis(150));
    }

    #[test]
    fn nothing_settles_inside_the_window() {
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        let now = Instant::now();
        debouncer.push_at(event(Modify, "/n/a.note"), now);

        assert!(debouncer.drain_ready_at(now + Duration::from_millis(50)).is_empty());
        let ready = debouncer.drain_ready_at(now + Duration::from_millis(100));
        assert_eq!(ready, vec![event(Modify, "/n/a.note")]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[test]
    fn new_note_written_after_creation_is_a_create() {
        assert_eq!(settle(&[Create, Modify, Modify]), vec![event(Create, "/n/a.note")]);
    }

    #[test]
    fn note_that_came_and_went_is_dropped() {
        assert!(settle(&[Create, Modify, Remove]).is_empty());
    }

    #[test]
    fn save_through_rename_is_a_modify() {
        assert_eq!(settle(&[Remove, Create, Modify]), vec![event(Modify, "/n/a.note")]);
    }

    #[test]
    fn edited_then_deleted_is_a_remove() {
        assert_eq!(settle(&[Modify, Remove]), vec![event(Remove, "/n/a.note")]);
    }

    #[test]
    fn recreated_within_the_burst_is_still_a_create() {
        assert_eq!(settle(&[Create, Remove, Create]), vec![event(Create, "/n/a.note")]);
    }

    #[test]
    fn later_events_restart_the_window() {
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        let now = Instant::now();
        debouncer.push_at(event(Create, "/n/a.note"), now);
        debouncer.push_at(event(Modify, "/n/a.note"), now + Duration::from_millis(80));

        assert!(debouncer.drain_ready_at(now + Duration::from_millis(120)).is_empty());
        assert_eq!(debouncer.next_deadline(), Some(now + Duration::from_millis(180)));
    }

    #[test]
    fn paths_settle_independently() {
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        let now = Instant::now();
        debouncer.push_at(event(Create, "/n/a.note"), now);
        debouncer.push_at(event(Create, "/n/b.note"), now + Duration::from_millis(80));

        assert_eq!(debouncer.next_deadline(), Some(now + Duration::from_millis(100)));
        let ready = debouncer.drain_ready_at(now + Duration::from_millis(120));
        assert_eq!(ready, vec![event(Create, "/n/a.note")]);
        assert_eq!(debouncer.next_deadline(), Some(now + Duration::from_millis(180)));
    }

    #[test]
    fn empty_debouncer_has_no_deadline() {
        let debouncer = Debouncer::new(DebounceConfig::default());
        assert!(debouncer.next_deadline().is_none());
    }
}
