//! Event log: `commits/<h2>/<h38>/events/<uuid>/` with an `eventType` file
//! and a type-specific payload, one directory per user-observable change a
//! Transformer produced. Event UUIDs are time-ordered (UUIDv7) so a
//! directory listing yields chronological order.

use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::hash::CommitHash;

/// The kind of user-observable change an event records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    NewRelease,
    Deployment,
    LockCreated,
    LockDeleted,
}

impl EventType {
    fn as_str(&self) -> &'static str {
        match self {
            EventType::NewRelease => "new-release",
            EventType::Deployment => "deployment",
            EventType::LockCreated => "lock-created",
            EventType::LockDeleted => "lock-deleted",
        }
    }
}

/// One immutable entry in a commit's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    /// Flat key/value payload specific to `event_type`, e.g.
    /// `("environment", "acceptance")`.
    pub payload: Vec<(String, String)>,
}

fn commit_dir(commit: &CommitHash) -> String {
    format!("commits/{}/{}", commit.shard(), commit.rest())
}

fn events_dir(commit: &CommitHash) -> String {
    format!("{}/events", commit_dir(commit))
}

/// Append an event under `commit`'s event log, using a fresh time-ordered
/// UUID as its directory name.
pub async fn append_event<F: Filesystem>(
    fs: &F,
    commit: &CommitHash,
    event_type: EventType,
    payload: &[(&str, &str)],
) -> EngineResult<Uuid> {
    let id = Uuid::now_v7();
    let dir = fs.join(&[&events_dir(commit), &id.to_string()]);
    let type_path = fs.join(&[&dir, "eventType"]);
    fs.write(&type_path, event_type.as_str().as_bytes())
        .await
        .map_err(|e| EngineError::io(type_path, e))?;
    for (key, value) in payload {
        let path = fs.join(&[&dir, key]);
        fs.write(&path, value.as_bytes())
            .await
            .map_err(|e| EngineError::io(path, e))?;
    }
    Ok(id)
}

/// All events recorded for `commit`, ordered chronologically by UUID (the
/// directory listing is already lexicographic, and UUIDv7 sorts
/// lexicographically by creation time).
pub async fn list_events<F: Filesystem>(fs: &F, commit: &CommitHash) -> EngineResult<Vec<Event>> {
    let dir = events_dir(commit);
    let ids = crate::fs::list_names_or_empty(fs, &dir)
        .await
        .map_err(|e| EngineError::io(dir.clone(), e))?;
    let mut events = Vec::new();
    for id_str in ids {
        let id = Uuid::parse_str(&id_str)
            .map_err(|e| EngineError::internal(format!("malformed event id \"{id_str}\": {e}")))?;
        let event_dir = fs.join(&[&dir, &id_str]);
        let type_path = fs.join(&[&event_dir, "eventType"]);
        let raw_type = fs
            .read(&type_path)
            .await
            .map_err(|e| EngineError::io(type_path, e))?;
        let event_type = match String::from_utf8_lossy(&raw_type).as_ref() {
            "new-release" => EventType::NewRelease,
            "deployment" => EventType::Deployment,
            "lock-created" => EventType::LockCreated,
            "lock-deleted" => EventType::LockDeleted,
            other => return Err(EngineError::internal(format!("unknown event type \"{other}\""))),
        };
        let mut payload = Vec::new();
        for entry in fs
            .read_dir(&event_dir)
            .await
            .map_err(|e| EngineError::io(event_dir.clone(), e))?
        {
            if entry.name == "eventType" {
                continue;
            }
            let value_path = fs.join(&[&event_dir, &entry.name]);
            let value = fs
                .read(&value_path)
                .await
                .map_err(|e| EngineError::io(value_path, e))?;
            payload.push((entry.name, String::from_utf8_lossy(&value).to_string()));
        }
        payload.sort();
        events.push(Event {
            id,
            event_type,
            payload,
        });
    }
    events.sort_by_key(|e| e.id);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFilesystem;

    fn fake_commit() -> CommitHash {
        CommitHash::of(b"fixture")
    }

    #[tokio::test]
    async fn appended_events_are_readable_in_order() {
        let fs = MemoryFilesystem::new();
        let commit = fake_commit();
        append_event(&fs, &commit, EventType::NewRelease, &[("application", "app1")])
            .await
            .unwrap();
        append_event(&fs, &commit, EventType::Deployment, &[("environment", "acceptance")])
            .await
            .unwrap();
        let events = list_events(&fs, &commit).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::NewRelease);
        assert_eq!(events[1].event_type, EventType::Deployment);
    }

    #[tokio::test]
    async fn payload_round_trips() {
        let fs = MemoryFilesystem::new();
        let commit = fake_commit();
        append_event(
            &fs,
            &commit,
            EventType::Deployment,
            &[("environment", "acceptance"), ("application", "app1")],
        )
        .await
        .unwrap();
        let events = list_events(&fs, &commit).await.unwrap();
        assert_eq!(
            events[0].payload,
            vec![
                ("application".to_string(), "app1".to_string()),
                ("environment".to_string(), "acceptance".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn no_events_yields_empty_list() {
        let fs = MemoryFilesystem::new();
        assert!(list_events(&fs, &fake_commit()).await.unwrap().is_empty());
    }
}
