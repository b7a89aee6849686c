use super::*;

#[tokio::test]
async fn test_insufficient_space_aborts_batch_with_partial_summary() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(&root);
    config.disk_space.enabled = true;
    config.disk_space.min_free_space = u64::MAX;

    let backend = Arc::new(backend_for(&IDS[..2], 1000));
    let transport = Arc::new(transport_for(&IDS[..2], 1000));
    let downloader = downloader_with_config(config, backend, transport.clone()).await;

    let result = downloader
        .download_batch([watch_url(IDS[0]), watch_url(IDS[1])])
        .await;

    match result {
        Err(Error::BatchAborted { reason, summary }) => {
            assert!(reason.contains("insufficient disk space"));
            assert_eq!(summary.stats.total, 2);
            assert_eq!(summary.stats.completed, 0);
            assert_eq!(summary.stats.failed, 2);
            assert!(
                summary
                    .failures
                    .iter()
                    .any(|item| item.kind == FailureKind::InsufficientSpace)
            );
        }
        other => panic!("expected BatchAborted, got {other:?}"),
    }
    assert_eq!(transport.range_requests(), 0);
}

#[tokio::test]
async fn test_unknown_size_skips_space_check() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(&root);
    config.disk_space.enabled = true;
    config.disk_space.min_free_space = u64::MAX;

    let mut format = direct_format(IDS[0], 0);
    format.file_size = None;
    let backend = Arc::new(FakeBackend::new().with_record(record(IDS[0], "No Size", vec![format])));
    let transport = Arc::new(transport_for(&IDS[..1], 256));
    let downloader = downloader_with_config(config, backend, transport).await;

    let outcome = downloader.download_one(&watch_url(IDS[0])).await.unwrap();

    assert_eq!(outcome.state, TaskState::Completed);
    assert_eq!(outcome.bytes, 256);
}
