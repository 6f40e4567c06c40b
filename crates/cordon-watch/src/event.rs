//! Classified filesystem events.

use cordon_core::Timestamp;
use notify::event::{Event, EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// The kind of a buffered filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsEventKind {
    /// A file or directory appeared.
    Create,
    /// File content (or metadata) changed.
    Modify,
    /// A file or directory was removed.
    Delete,
    /// A rename observed with both halves paired.
    Rename,
}

/// One buffered filesystem event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsEvent {
    /// What happened.
    pub kind: FsEventKind,
    /// The affected path (the new path for renames).
    pub path: String,
    /// When the event was buffered.
    pub timestamp: Timestamp,
    /// The original path, for paired renames only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

impl FsEvent {
    fn new(kind: FsEventKind, path: String, old_path: Option<String>) -> Self {
        Self {
            kind,
            path,
            timestamp: Timestamp::now(),
            old_path,
        }
    }
}

/// Map one raw watcher event onto zero or more buffered events.
///
/// Renames arrive as a single paired event on platforms that track both
/// halves; unpaired halves degrade to a delete or a create, which the
/// session contract explicitly allows.
pub(crate) fn classify(event: &Event) -> Vec<FsEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| FsEvent::new(FsEventKind::Create, p.display().to_string(), None))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| FsEvent::new(FsEventKind::Delete, p.display().to_string(), None))
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => classify_rename(event, *mode),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| FsEvent::new(FsEventKind::Modify, p.display().to_string(), None))
            .collect(),
        _ => Vec::new(),
    }
}

fn classify_rename(event: &Event, mode: RenameMode) -> Vec<FsEvent> {
    match mode {
        RenameMode::Both if event.paths.len() >= 2 => {
            vec![FsEvent::new(
                FsEventKind::Rename,
                event.paths[1].display().to_string(),
                Some(event.paths[0].display().to_string()),
            )]
        },
        RenameMode::From => event
            .paths
            .iter()
            .map(|p| FsEvent::new(FsEventKind::Delete, p.display().to_string(), None))
            .collect(),
        RenameMode::To => event
            .paths
            .iter()
            .map(|p| FsEvent::new(FsEventKind::Create, p.display().to_string(), None))
            .collect(),
        // Unpaired or unknown rename information: surface as a modify so
        // the change is not lost.
        _ => event
            .paths
            .iter()
            .map(|p| FsEvent::new(FsEventKind::Modify, p.display().to_string(), None))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};
    use std::path::PathBuf;

    fn raw(kind: EventKind, paths: Vec<&str>) -> Event {
        Event {
            kind,
            paths: paths.into_iter().map(PathBuf::from).collect(),
            attrs: notify::event::EventAttributes::default(),
        }
    }

    #[test]
    fn test_create_and_remove_classification() {
        let events = classify(&raw(EventKind::Create(CreateKind::File), vec!["/ws/a"]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FsEventKind::Create);

        let events = classify(&raw(EventKind::Remove(RemoveKind::File), vec!["/ws/a"]));
        assert_eq!(events[0].kind, FsEventKind::Delete);
    }

    #[test]
    fn test_paired_rename_carries_old_path() {
        let events = classify(&raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec!["/ws/old", "/ws/new"],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FsEventKind::Rename);
        assert_eq!(events[0].path, "/ws/new");
        assert_eq!(events[0].old_path.as_deref(), Some("/ws/old"));
    }

    #[test]
    fn test_unpaired_rename_halves_degrade() {
        let from = classify(&raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            vec!["/ws/old"],
        ));
        assert_eq!(from[0].kind, FsEventKind::Delete);

        let to = classify(&raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            vec!["/ws/new"],
        ));
        assert_eq!(to[0].kind, FsEventKind::Create);
    }

    #[test]
    fn test_access_events_are_dropped() {
        let events = classify(&raw(
            EventKind::Access(notify::event::AccessKind::Read),
            vec!["/ws/a"],
        ));
        assert!(events.is_empty());
    }
}
