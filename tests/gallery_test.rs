use anyhow::Result;
use async_trait::async_trait;
use chatlist::budget::ImageMemoryBudget;
use chatlist::decode::ImageRequest;
use chatlist::gallery::{GalleryPreloadWindow, GalleryState};
use chatlist::image_cache::{ImageCacheConfig, ImageDecodeCache};
use chatlist::net::{HttpClient, HttpRequest, HttpResponse};
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

const GRACE: Duration = Duration::from_millis(300);
const PAGES: usize = 10;

/// Every url is a 4x4 PNG.
struct TinyPngs;

#[async_trait]
impl HttpClient for TinyPngs {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let mut body = Vec::new();
        img.write_to(&mut Cursor::new(&mut body), ImageFormat::Png)?;
        Ok(HttpResponse {
            status_code: 200,
            body,
        })
    }
}

fn page_url(index: usize) -> String {
    format!("https://cdn/page-{index}.png")
}

fn setup() -> (Arc<ImageDecodeCache>, Arc<GalleryPreloadWindow>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let cache = ImageDecodeCache::new(
        Arc::new(TinyPngs),
        Arc::new(ImageMemoryBudget::with_ceiling_mb(10)),
        ImageCacheConfig::default(),
    );
    let pages = (0..PAGES).map(|i| ImageRequest::new(page_url(i))).collect();
    let gallery = GalleryPreloadWindow::new(Arc::clone(&cache), pages, 1, GRACE);
    (cache, gallery)
}

fn set(values: &[usize]) -> BTreeSet<usize> {
    values.iter().copied().collect()
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_window_loads_center_and_neighbours() {
    let (cache, gallery) = setup();
    assert_eq!(gallery.state(), GalleryState::Idle);

    gallery.set_center(5);
    wait_until("window {4,5,6}", || gallery.held_indices() == set(&[4, 5, 6])).await;

    assert_eq!(gallery.state(), GalleryState::Windowed);
    assert_eq!(cache.len(), 3);
    assert!(gallery.image(5).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_window_at_first_page_is_clamped() {
    let (_cache, gallery) = setup();
    gallery.set_center(0);
    wait_until("window {0,1}", || gallery.held_indices() == set(&[0, 1])).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pages_leaving_window_are_disposed_after_grace() {
    let (cache, gallery) = setup();
    gallery.set_center(5);
    wait_until("initial window", || gallery.held_indices() == set(&[4, 5, 6])).await;

    gallery.set_center(7);
    assert_eq!(gallery.state(), GalleryState::DisposingScheduled);
    assert!(gallery.held_indices().contains(&4));

    wait_until("grace disposal", || gallery.held_indices() == set(&[6, 7, 8])).await;
    assert_eq!(gallery.state(), GalleryState::Windowed);
    assert!(!cache.contains(&page_url(4)));
    assert!(!cache.contains(&page_url(5)));
    assert!(cache.contains(&page_url(8)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_returning_within_grace_keeps_pages() {
    let (cache, gallery) = setup();
    gallery.set_center(5);
    wait_until("initial window", || gallery.held_indices() == set(&[4, 5, 6])).await;

    gallery.set_center(6);
    assert_eq!(gallery.state(), GalleryState::DisposingScheduled);
    gallery.set_center(5);
    assert_eq!(gallery.state(), GalleryState::Windowed);

    tokio::time::sleep(GRACE * 2).await;
    assert!(gallery.held_indices().is_superset(&set(&[4, 5, 6])));
    assert!(cache.contains(&page_url(4)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aggressive_cleanup_keeps_only_center() {
    let (cache, gallery) = setup();
    gallery.set_center(3);
    wait_until("initial window", || gallery.held_indices() == set(&[2, 3, 4])).await;

    gallery.aggressive_cleanup();
    assert_eq!(gallery.held_indices(), set(&[3]));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.budget().current(), 4 * 4 * 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_teardown_releases_everything() {
    let (cache, gallery) = setup();
    gallery.set_center(5);
    wait_until("initial window", || gallery.held_indices() == set(&[4, 5, 6])).await;

    gallery.teardown();
    assert_eq!(gallery.state(), GalleryState::Disposed);
    assert!(gallery.held_indices().is_empty());
    assert!(cache.is_empty());
    assert_eq!(cache.budget().current(), 0);

    gallery.set_center(2);
    assert_eq!(gallery.state(), GalleryState::Disposed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_memory_pressure_keeps_center() {
    let (cache, gallery) = setup();
    gallery.set_center(5);
    wait_until("initial window", || gallery.held_indices() == set(&[4, 5, 6])).await;

    cache.budget().on_pressure_signal();
    assert_eq!(gallery.held_indices(), set(&[5]));
    assert!(gallery.image(5).is_some());
    assert!(cache.contains(&page_url(5)));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.budget().current(), 4 * 4 * 4);
}
