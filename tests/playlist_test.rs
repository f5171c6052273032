//! Playlist resolution and segment download against a local HTTP server.
//!
//! Run with: `cargo test`

use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use camrec::error::RecorderError;
use camrec::fetcher::SegmentFetcher;
use camrec::playlist::PlaylistResolver;

const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000\n\
chunklist.m3u8\n";

const CHUNKLIST: &str = "#EXTM3U\n\
#EXT-X-TARGETDURATION:4\n\
#EXT-X-MEDIA-SEQUENCE:10\n\
#EXTINF:4.0,\n\
media_10.ts\n\
#EXTINF:4.0,\n\
media_11.ts\n";

async fn serve(server: &MockServer, route: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{route}", server.uri())).unwrap()
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn test_master_resolves_through_variant() {
    let server = MockServer::start().await;
    serve(&server, "/live/CAM72/playlist.m3u8", MASTER).await;
    serve(&server, "/live/CAM72/chunklist.m3u8", CHUNKLIST).await;

    let resolver = PlaylistResolver::new(client());
    let resolved = resolver
        .resolve(&url(&server, "/live/CAM72/playlist.m3u8"))
        .await
        .expect("resolve");

    assert_eq!(resolved.variant, Some(url(&server, "/live/CAM72/chunklist.m3u8")));
    assert_eq!(resolved.playlist_url, url(&server, "/live/CAM72/chunklist.m3u8"));
    assert_eq!(
        resolved.segments,
        vec![url(&server, "/live/CAM72/media_10.ts"), url(&server, "/live/CAM72/media_11.ts")]
    );
}

#[tokio::test]
async fn test_flat_playlist_is_used_directly() {
    let server = MockServer::start().await;
    serve(&server, "/live/CAM45/playlist.m3u8", CHUNKLIST).await;

    let resolver = PlaylistResolver::new(client());
    let resolved = resolver
        .resolve(&url(&server, "/live/CAM45/playlist.m3u8"))
        .await
        .expect("resolve");

    assert!(resolved.variant.is_none());
    assert_eq!(resolved.segments.len(), 2);
}

#[tokio::test]
async fn test_missing_master_is_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolver = PlaylistResolver::new(client());
    let err = resolver
        .resolve(&url(&server, "/live/CAM72/playlist.m3u8"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::Fetch { status: 404, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_missing_variant_is_fetch_error() {
    let server = MockServer::start().await;
    serve(&server, "/live/CAM72/playlist.m3u8", MASTER).await;

    let resolver = PlaylistResolver::new(client());
    let err = resolver
        .resolve(&url(&server, "/live/CAM72/playlist.m3u8"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::Fetch { status: 404, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_segments_written_in_order() {
    let server = MockServer::start().await;
    serve(&server, "/live/CAM72/playlist.m3u8", MASTER).await;
    serve(&server, "/live/CAM72/chunklist.m3u8", CHUNKLIST).await;
    serve(&server, "/live/CAM72/media_10.ts", vec![0x47u8; 3000]).await;
    serve(&server, "/live/CAM72/media_11.ts", vec![0x48u8; 188]).await;

    let dir = tempfile::tempdir().expect("create tempdir");
    let resolved = PlaylistResolver::new(client())
        .resolve(&url(&server, "/live/CAM72/playlist.m3u8"))
        .await
        .expect("resolve");

    // Chunk smaller than the body to exercise the chunked write path.
    let fetcher = SegmentFetcher::new(client(), 1024);
    let summary = fetcher.fetch_all(&resolved.segments, dir.path()).await.expect("fetch");

    assert!(summary.failed.is_empty());
    assert_eq!(summary.written.len(), 2);
    assert_eq!(summary.total_bytes(), 3188);

    let first = std::fs::read(dir.path().join("segment_0.ts")).expect("segment_0");
    let second = std::fs::read(dir.path().join("segment_1.ts")).expect("segment_1");
    assert_eq!(first, vec![0x47u8; 3000]);
    assert_eq!(second, vec![0x48u8; 188]);
}

#[tokio::test]
async fn test_failed_segment_does_not_stop_the_rest() {
    let server = MockServer::start().await;
    serve(&server, "/live/CAM72/media_11.ts", b"ok".to_vec()).await;
    Mock::given(method("GET"))
        .and(path("/live/CAM72/media_10.ts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("create tempdir");
    let segments = vec![url(&server, "/live/CAM72/media_10.ts"), url(&server, "/live/CAM72/media_11.ts")];
    let summary = SegmentFetcher::new(client(), 1024)
        .fetch_all(&segments, dir.path())
        .await
        .expect("fetch");

    assert_eq!(summary.failed, vec![0]);
    assert_eq!(summary.written.len(), 1);
    assert_eq!(summary.written[0].index, 1);
    assert!(!dir.path().join("segment_0.ts").exists());
    assert_eq!(std::fs::read(dir.path().join("segment_1.ts")).unwrap(), b"ok");
}

#[tokio::test]
async fn test_empty_playlist_writes_nothing() {
    let server = MockServer::start().await;
    serve(&server, "/live/CAM72/playlist.m3u8", "#EXTM3U\n#EXT-X-TARGETDURATION:4\n").await;

    let dir = tempfile::tempdir().expect("create tempdir");
    let resolved = PlaylistResolver::new(client())
        .resolve(&url(&server, "/live/CAM72/playlist.m3u8"))
        .await
        .expect("resolve");
    let summary = SegmentFetcher::new(client(), 1024)
        .fetch_all(&resolved.segments, &dir.path().join("CAM72"))
        .await
        .expect("fetch");

    assert!(summary.written.is_empty());
    assert!(dir.path().join("CAM72").is_dir());
}
