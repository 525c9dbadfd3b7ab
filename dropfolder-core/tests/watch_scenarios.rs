use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dropfolder_core::watch::{
    EventSender, RecordingNotifier, WatchEvent, WatchMessage, control_channel,
};
use dropfolder_core::{
    BatchOrigin, BencodeValidator, Collaborators, CollectingSink, DropFolderWatcher,
    FixedClassifier, InMemoryFs, ReadyBatch, WatchConfig, WatchFs, WatchMode, WatchService,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const TORRENT: &[u8] = b"d8:announce9:http://tr4:infod6:lengthi3e4:name5:a.bin12:piece lengthi16384e6:pieces0:ee";

struct Scenario {
    watcher: DropFolderWatcher,
    events: UnboundedReceiver<WatchMessage>,
    fs: Arc<InMemoryFs>,
    sink: CollectingSink,
}

impl Scenario {
    fn new(mode: WatchMode) -> Self {
        let fs = Arc::new(InMemoryFs::new());
        let contents = Arc::clone(&fs);
        let validator = BencodeValidator::new();
        let collaborators = Collaborators {
            classifier: Box::new(FixedClassifier(mode)),
            validator: Arc::new(move |path: &Path| {
                contents
                    .contents(path)
                    .is_some_and(|bytes| validator.validate_bytes(&bytes))
            }),
            notifier: Box::new(RecordingNotifier::new()),
            fs: fs.clone(),
        };
        let (tx, events) = control_channel();
        let sink = CollectingSink::new();
        let watcher = DropFolderWatcher::new(
            &WatchConfig::default(),
            collaborators,
            EventSender::new(tx),
            sink.clone(),
        );
        Self {
            watcher,
            events,
            fs,
            sink,
        }
    }

    /// Wait for the next timer event and let the watcher handle it.
    async fn tick(&mut self) -> WatchEvent {
        let event = match self.events.recv().await {
            Some(WatchMessage::Event(event)) => event,
            other => panic!("expected a timer event, got {other:?}"),
        };
        self.watcher.handle(event.clone());
        event
    }
}

fn path(p: &str) -> PathBuf {
    PathBuf::from(p)
}

#[tokio::test(start_paused = true)]
async fn torrent_completed_on_second_reconcile_tick_is_reported_once() {
    let mut s = Scenario::new(WatchMode::Local);
    s.fs.write_file("/dropfolder-it/d/a.torrent", &TORRENT[..20]);
    s.watcher.add_path(Path::new("/dropfolder-it/d"));

    assert!(s.sink.take().is_empty());
    assert_eq!(s.watcher.partial_retry_count(Path::new("/dropfolder-it/d/a.torrent")), Some(0));

    assert!(matches!(s.tick().await, WatchEvent::ReconcileTick { .. }));
    assert_eq!(s.watcher.partial_retry_count(Path::new("/dropfolder-it/d/a.torrent")), Some(1));
    assert!(s.sink.take().is_empty());

    s.fs.write_file("/dropfolder-it/d/a.torrent", TORRENT);
    s.tick().await;

    assert_eq!(
        s.sink.take(),
        vec![ReadyBatch {
            origin: BatchOrigin::Reconcile,
            files: vec![path("/dropfolder-it/d/a.torrent")],
        }]
    );
    assert_eq!(s.watcher.partial_count(), 0);
    assert!(!s.fs.exists(Path::new("/dropfolder-it/d/a.torrent.invalid")));
    assert!(!s.watcher.is_reconcile_active());
}

#[tokio::test(start_paused = true)]
async fn permanently_malformed_torrent_is_renamed_and_never_reported() {
    let mut s = Scenario::new(WatchMode::Local);
    s.fs.write_file("/dropfolder-it/d/b.torrent", "not bencode");
    s.watcher.add_path(Path::new("/dropfolder-it/d"));

    for k in 1..=5 {
        s.tick().await;
        assert_eq!(
            s.watcher.partial_retry_count(Path::new("/dropfolder-it/d/b.torrent")),
            Some(k)
        );
    }
    assert!(s.fs.exists(Path::new("/dropfolder-it/d/b.torrent")));

    // The counter sits at the ceiling; the sixth tick gives up.
    s.tick().await;

    assert_eq!(s.watcher.partial_count(), 0);
    assert!(!s.fs.exists(Path::new("/dropfolder-it/d/b.torrent")));
    assert_eq!(
        s.fs.contents(Path::new("/dropfolder-it/d/b.torrent.invalid")),
        Some(b"not bencode".to_vec())
    );
    assert!(s.sink.take().is_empty());
    assert!(!s.watcher.is_reconcile_active());

    // Renamed files no longer match on rescan.
    s.watcher
        .handle(WatchEvent::DirectoryChanged(path("/dropfolder-it/d")));
    assert!(s.sink.take().is_empty());
    assert_eq!(s.watcher.partial_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn vanished_partial_file_is_dropped_silently() {
    let mut s = Scenario::new(WatchMode::Local);
    s.fs.write_file("/dropfolder-it/d/c.torrent", "d4:inf");
    s.watcher.add_path(Path::new("/dropfolder-it/d"));
    s.tick().await;

    s.fs.remove(Path::new("/dropfolder-it/d/c.torrent"));
    s.tick().await;

    assert_eq!(s.watcher.partial_count(), 0);
    assert!(!s.fs.exists(Path::new("/dropfolder-it/d/c.torrent.invalid")));
    assert!(s.sink.take().is_empty());
    assert!(!s.watcher.is_reconcile_active());
}

#[tokio::test(start_paused = true)]
async fn magnet_only_directory_reports_once_per_pass() {
    let mut s = Scenario::new(WatchMode::Local);
    s.fs.write_file("/dropfolder-it/m/x.magnet", "magnet:?xt=urn:btih:x");
    s.watcher.add_path(Path::new("/dropfolder-it/m"));

    let batches = s.sink.take();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].files, vec![path("/dropfolder-it/m/x.magnet")]);
    assert_eq!(s.watcher.partial_count(), 0);
    assert!(!s.watcher.is_reconcile_active());
}

#[tokio::test(start_paused = true)]
async fn duplicate_network_registration_polls_once_per_interval() {
    let mut s = Scenario::new(WatchMode::Network);
    s.fs.write_file("/dropfolder-it/net/x.magnet", "magnet:?xt=urn:btih:x");
    s.watcher.add_path(Path::new("/dropfolder-it/net"));
    s.watcher.add_path(Path::new("/dropfolder-it/net/"));
    s.watcher.add_path(Path::new("/dropfolder-it/./net"));
    assert_eq!(s.watcher.directories().len(), 1);

    for _ in 0..3 {
        assert!(matches!(s.tick().await, WatchEvent::NetworkPollTick { .. }));
    }
    let batches = s.sink.take();
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|batch| batch.files.len() == 1));
    assert!(s.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn poll_timer_lives_while_any_network_directory_remains() {
    let mut s = Scenario::new(WatchMode::Network);
    s.fs.add_dir("/dropfolder-it/n1");
    s.fs.add_dir("/dropfolder-it/n2");
    s.watcher.add_path(Path::new("/dropfolder-it/n1"));
    s.watcher.add_path(Path::new("/dropfolder-it/n2"));

    s.watcher.remove_path(Path::new("/dropfolder-it/n2"));
    assert!(s.watcher.is_network_poll_active());

    s.watcher.remove_path(Path::new("/dropfolder-it/n1"));
    assert!(!s.watcher.is_network_poll_active());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(s.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn network_partials_share_the_reconcile_timer() {
    let mut s = Scenario::new(WatchMode::Network);
    s.fs.write_file("/dropfolder-it/net/a.torrent", "d4:i");
    s.watcher.add_path(Path::new("/dropfolder-it/net"));

    // The poll registers the partial and arms reconciliation one interval
    // later; both timers then fire together on every interval.
    assert!(matches!(s.tick().await, WatchEvent::NetworkPollTick { .. }));
    assert!(s.watcher.is_reconcile_active());
    assert_eq!(s.watcher.partial_retry_count(Path::new("/dropfolder-it/net/a.torrent")), Some(0));

    s.fs.write_file("/dropfolder-it/net/a.torrent", TORRENT);
    let mut reported = Vec::new();
    for _ in 0..2 {
        s.tick().await;
        reported.extend(s.sink.take());
    }
    // Both passes may see the completed file; each reports it at most once.
    assert!(!reported.is_empty());
    assert!(
        reported
            .iter()
            .all(|batch| batch.files == vec![path("/dropfolder-it/net/a.torrent")])
    );
    assert_eq!(s.watcher.partial_count(), 0);
    assert!(!s.watcher.is_reconcile_active());
}

#[tokio::test]
async fn local_directory_on_disk_reports_initial_and_new_files() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join("before.magnet"), "magnet:?xt=urn:btih:before").unwrap();

    let (sink, mut batches) = mpsc::unbounded_channel::<ReadyBatch>();
    let service = WatchService::spawn(
        WatchConfig::default(),
        Collaborators::system(BencodeValidator::new())
            .with_classifier(FixedClassifier(WatchMode::Local)),
        sink,
    );
    service.add_path(&root).unwrap();

    let initial = tokio::time::timeout(Duration::from_secs(5), batches.recv())
        .await
        .expect("no initial scan within 5s")
        .expect("sink closed");
    assert_eq!(initial.origin, BatchOrigin::InitialScan(root.clone()));
    assert_eq!(initial.files, vec![root.join("before.magnet")]);

    let staging = root.join("after.part");
    std::fs::write(&staging, TORRENT).unwrap();
    std::fs::rename(&staging, root.join("after.torrent")).unwrap();

    let target = root.join("after.torrent");
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(batch) = batches.recv().await {
            if batch.files.contains(&target) {
                return batch;
            }
        }
        panic!("sink closed before the new torrent was reported");
    })
    .await
    .expect("new torrent not reported within 5s");
    assert_eq!(found.origin, BatchOrigin::LocalChange(root.clone()));

    assert_eq!(
        service.directories().await.unwrap().into_iter().collect::<Vec<_>>(),
        vec![root]
    );
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn single_write_on_disk_is_reported_once() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();

    let (sink, mut batches) = mpsc::unbounded_channel::<ReadyBatch>();
    let service = WatchService::spawn(
        WatchConfig::default(),
        Collaborators::system(BencodeValidator::new())
            .with_classifier(FixedClassifier(WatchMode::Local)),
        sink,
    );
    service.add_path(&root).unwrap();
    service.directories().await.unwrap();

    std::fs::write(root.join("a.torrent"), TORRENT).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let target = root.join("a.torrent");
    let mut reports = 0;
    while let Ok(batch) = batches.try_recv() {
        assert_eq!(batch.origin, BatchOrigin::LocalChange(root.clone()));
        reports += batch.files.iter().filter(|file| **file == target).count();
    }
    assert_eq!(reports, 1);
    service.shutdown().await.unwrap();
}
