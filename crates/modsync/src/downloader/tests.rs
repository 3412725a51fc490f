//! Tests for the download orchestrator and the HTTP transport

use super::*;
use crate::core::{DownloadLocator, ModfileHash, RequestError, RequestErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const PAYLOAD: &[u8] = b"Hello, World!";
const PAYLOAD_MD5: &str = "65a8e27d8879283831b664bd8b7f0ad4";

fn test_modfile(mod_id: i64, id: i64, url: &str) -> Modfile {
    Modfile {
        id,
        mod_id,
        date_added: 0,
        file_size: PAYLOAD.len() as u64,
        file_hash: Some(ModfileHash {
            md5: Some(PAYLOAD_MD5.to_string()),
        }),
        filename: Some(format!("{}.zip", id)),
        download_locator: Some(DownloadLocator {
            binary_url: url.to_string(),
            date_expires: i64::MAX,
        }),
        version: None,
        changelog: None,
        metadata_blob: None,
    }
}

/// Transport that writes a fixed payload after a short delay and counts calls
struct FakeTransport {
    payload: Vec<u8>,
    delay: Duration,
    calls: AtomicUsize,
    fail: bool,
    panic_first: bool,
}

impl FakeTransport {
    fn new(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            delay: Duration::from_millis(50),
            calls: AtomicUsize::new(0),
            fail: false,
            panic_first: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(b"")
        }
    }

    /// Panics on the first transfer, behaves on later ones
    fn panicking_once(payload: &[u8]) -> Self {
        Self {
            panic_first: true,
            ..Self::new(payload)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BinaryTransport for FakeTransport {
    async fn download(&self, _modfile: &Modfile, destination: &Path) -> Result<u64> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.panic_first && previous == 0 {
            panic!("transport blew up");
        }
        if self.fail {
            return Err(RequestError::from_status("fake://binary", 503, "unavailable", None).into());
        }
        tokio::fs::write(destination, &self.payload).await.unwrap();
        Ok(self.payload.len() as u64)
    }
}

#[cfg(test)]
mod orchestrator_tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_starts_share_one_transfer() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(PAYLOAD));
        let orchestrator = DownloadOrchestrator::new(transport.clone());
        let modfile = test_modfile(5, 9, "fake://5/9");
        let dest = dir.path().join("5").join("9.zip");

        let first = orchestrator.start_download(&modfile, dest.clone());
        let second = orchestrator.start_download(&modfile, dest.clone());
        assert!(orchestrator.is_downloading(modfile.identity()));

        let (a, b) = tokio::join!(first.wait(), second.wait());
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(a, b);
        assert_eq!(a.bytes, PAYLOAD.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), PAYLOAD);
        assert!(orchestrator.active_download(modfile.identity()).is_none());
    }

    #[tokio::test]
    async fn test_finished_download_can_be_restarted() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(PAYLOAD));
        let orchestrator = DownloadOrchestrator::new(transport.clone());
        let modfile = test_modfile(5, 9, "fake://5/9");
        let dest = dir.path().join("9.zip");

        orchestrator.start_download(&modfile, dest.clone()).wait().await.unwrap();
        orchestrator.start_download(&modfile, dest.clone()).wait().await.unwrap();

        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_panicking_transport_does_not_wedge_identity() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(FakeTransport::panicking_once(PAYLOAD));
        let orchestrator = DownloadOrchestrator::new(transport.clone());
        let modfile = test_modfile(5, 9, "fake://5/9");
        let dest = dir.path().join("9.zip");

        let error = orchestrator
            .start_download(&modfile, dest.clone())
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(error, SyncError::TaskFailed { .. }));
        assert!(!orchestrator.is_downloading(modfile.identity()));

        let info = orchestrator.start_download(&modfile, dest.clone()).wait().await.unwrap();
        assert_eq!(info.bytes, PAYLOAD.len() as u64);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_events_are_published_per_identity() {
        let dir = tempdir().unwrap();
        let orchestrator = DownloadOrchestrator::new(Arc::new(FakeTransport::new(PAYLOAD)));
        let mut events = orchestrator.subscribe();
        let modfile = test_modfile(5, 9, "fake://5/9");

        orchestrator
            .start_download(&modfile, dir.path().join("9.zip"))
            .wait()
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            DownloadEvent::Succeeded { identity, info } => {
                assert_eq!(identity, ModfileIdentity::new(5, 9));
                assert_eq!(info.path, dir.path().join("9.zip"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_fails_task() {
        let dir = tempdir().unwrap();
        let orchestrator = DownloadOrchestrator::new(Arc::new(FakeTransport::failing()));
        let mut events = orchestrator.subscribe();
        let modfile = test_modfile(5, 9, "fake://5/9");

        let error = orchestrator
            .start_download(&modfile, dir.path().join("9.zip"))
            .wait()
            .await
            .unwrap_err();

        assert!(matches!(error, SyncError::DownloadFailed { .. }));
        assert!(error.is_recoverable());
        let event = events.recv().await.unwrap();
        assert!(matches!(event, DownloadEvent::Failed { .. }));
        assert_eq!(event.identity(), modfile.identity());
    }

    #[tokio::test]
    async fn test_integrity_mismatch_removes_archive() {
        let dir = tempdir().unwrap();
        let orchestrator = DownloadOrchestrator::new(Arc::new(FakeTransport::new(b"Hello, World?")));
        let modfile = test_modfile(5, 9, "fake://5/9");
        let dest = dir.path().join("9.zip");

        let error = orchestrator
            .start_download(&modfile, dest.clone())
            .wait()
            .await
            .unwrap_err();

        match error {
            SyncError::DownloadFailed { source, .. } => {
                assert!(matches!(*source, SyncError::IntegrityMismatch { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!dest.exists());
    }
}

#[cfg(test)]
mod http_transport_tests {
    use super::*;
    use crate::config::SyncConfig;

    #[tokio::test]
    async fn test_streams_binary_to_destination() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mods/5/files/9.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("9.zip");
        let url = format!("{}/mods/5/files/9.zip", mock_server.uri());
        let transport = HttpTransport::new(&SyncConfig::default()).unwrap();

        let bytes = transport
            .download(&test_modfile(5, 9, &url), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, PAYLOAD.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), PAYLOAD);
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unresolvable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("9.zip");
        let url = format!("{}/gone.zip", mock_server.uri());
        let transport = HttpTransport::new(&SyncConfig::default()).unwrap();

        let error = transport
            .download(&test_modfile(5, 9, &url), &dest)
            .await
            .unwrap_err();

        assert_eq!(
            error.request_error().map(|e| e.kind),
            Some(RequestErrorKind::Unresolvable)
        );
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_orchestrated_http_download_is_verified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("mods").join("5").join("binaries").join("9.zip");
        let transport = HttpTransport::new(&SyncConfig::default()).unwrap();
        let orchestrator = DownloadOrchestrator::new(Arc::new(transport));
        let modfile = test_modfile(5, 9, &format!("{}/bin", mock_server.uri()));

        let info = orchestrator.start_download(&modfile, dest.clone()).wait().await.unwrap();

        assert_eq!(info.path, dest);
        assert!(FileValidation::for_modfile(&modfile).is_valid(&dest).await);
    }
}
