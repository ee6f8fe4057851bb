use std::path::Path;

use anyhow::Context;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pod_harness_core::prelude::NodeFileKind;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
pub enum WatchEvent {
    /// A marker file for this node index was created or moved into place.
    MarkerCreated(usize),
    Error(notify::Error),
}

/// Watches the log directory for marker files being created.
///
/// The underlying OS watch is released when this value is dropped, after which the receiver
/// drains and then reports closed.
pub struct MarkerWatch {
    _watcher: RecommendedWatcher,
}

impl MarkerWatch {
    pub fn start(dir: &Path) -> anyhow::Result<(Self, UnboundedReceiver<WatchEvent>)> {
        let (sender, receiver) = unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            forward(&sender, res);
        })
        .context("Could not begin watching for marker files")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Could not watch {}", dir.display()))?;

        log::debug!("Watching {} for marker files", dir.display());
        Ok((Self { _watcher: watcher }, receiver))
    }
}

fn forward(sender: &UnboundedSender<WatchEvent>, res: notify::Result<Event>) {
    let events = match res {
        Ok(event) if appears(&event.kind) => event
            .paths
            .iter()
            .filter_map(|path| NodeFileKind::Marker.parse(path).ok())
            .map(WatchEvent::MarkerCreated)
            .collect(),
        Ok(_) => Vec::new(),
        Err(e) => vec![WatchEvent::Error(e)],
    };

    for event in events {
        // The barrier has finished with us if the receiver is gone.
        if sender.send(event).is_err() {
            return;
        }
    }
}

fn appears(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::CreateKind;
    use std::path::PathBuf;

    fn event(kind: EventKind, name: &str) -> notify::Result<Event> {
        Ok(Event::new(kind).add_path(PathBuf::from("/logs").join(name)))
    }

    #[test]
    fn forwards_only_marker_creation() {
        let (sender, mut receiver) = unbounded_channel();

        forward(&sender, event(EventKind::Create(CreateKind::File), "marker-file-2.txt"));
        forward(&sender, event(EventKind::Create(CreateKind::File), "process-log-2.txt"));
        forward(&sender, event(EventKind::Modify(ModifyKind::Any), "marker-file-1.txt"));
        forward(
            &sender,
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                "marker-file-0.txt",
            ),
        );
        forward(&sender, Err(notify::Error::generic("boom")));

        assert!(matches!(receiver.try_recv(), Ok(WatchEvent::MarkerCreated(2))));
        assert!(matches!(receiver.try_recv(), Ok(WatchEvent::MarkerCreated(0))));
        assert!(matches!(receiver.try_recv(), Ok(WatchEvent::Error(_))));
        assert!(receiver.try_recv().is_err());
    }
}
