mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use common::{fetcher, html_page, test_store, FakeWeb, RecordingCapture, ROOT};
use onionspider::capture::{QueuedCapture, ScreenshotCapture};
use onionspider::models::{CaptureJob, EnqueueOptions, JobKind};
use onionspider::queue::{DieselJobQueue, JobQueue, JobStatus, DEFAULT_QUEUE};
use onionspider::repository::{DocumentStore, SqlitePool};
use onionspider::services::{
    load_seeds, submit_seeds, CrawlRequest, Spider, SpiderOptions, Worker, WorkerOptions,
};

fn options() -> WorkerOptions {
    WorkerOptions {
        concurrency: 2,
        job_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(20),
        purge_interval: Duration::from_millis(50),
    }
}

fn worker(
    web: &Arc<FakeWeb>,
    store: Arc<dyn DocumentStore>,
    queue: &Arc<DieselJobQueue>,
    capture: Option<Arc<dyn ScreenshotCapture>>,
    renderer: Option<Arc<RecordingCapture>>,
) -> Worker {
    let spider = Spider::new(
        fetcher(web),
        store,
        queue.clone(),
        capture,
        SpiderOptions::default(),
    );
    Worker::new(
        spider,
        renderer.map(|r| r as Arc<dyn ScreenshotCapture>),
        queue.clone(),
        options(),
    )
}

fn site(web: &FakeWeb) {
    web.page(
        ROOT,
        200,
        &html_page("Index", r#"<a href="/a">a</a><a href="/b">b</a>"#),
    );
    web.page(
        "http://example.onion/a",
        200,
        &html_page("A", r#"<a href="/deep">deep</a>"#),
    );
    web.page("http://example.onion/b", 404, "");
}

fn job_queue(pool: &SqlitePool) -> Arc<DieselJobQueue> {
    Arc::new(DieselJobQueue::new(pool.clone(), DEFAULT_QUEUE))
}

#[tokio::test]
async fn test_drain_crawls_seed_and_children() {
    let web = FakeWeb::new();
    site(&web);
    let (store, pool, _dir) = test_store().await;
    let queue = job_queue(&pool);
    let worker = worker(&web, store.clone(), &queue, None, None);

    let seed = JobKind::Crawl(CrawlRequest::seed(ROOT, 1).into());
    let seed_id = queue.enqueue(&seed, EnqueueOptions::default()).await.unwrap();

    let processed = worker.drain().await.unwrap();
    assert_eq!(processed, 3);

    assert_eq!(store.count().await.unwrap(), 3);
    let root = store.find_by_url(ROOT).await.unwrap().unwrap();
    let children = store.children_of(&root.id).await.unwrap();
    assert_eq!(children.len(), 2);

    // Depth ran out on the children, so /deep was never queued.
    assert!(!store.url_exists("http://example.onion/deep").await.unwrap());
    assert_eq!(web.calls("http://example.onion/deep"), 0);
    assert_eq!(queue.status_of(&seed_id).await.unwrap(), Some(JobStatus::Finished));
}

#[tokio::test]
async fn test_run_once_on_empty_queue() {
    let web = FakeWeb::new();
    let (store, pool, _dir) = test_store().await;
    let queue = job_queue(&pool);
    let worker = worker(&web, store, &queue, None, None);

    assert!(worker.run_once().await.unwrap().is_none());
}

#[tokio::test]
async fn test_capture_jobs_need_a_renderer() {
    let web = FakeWeb::new();
    let (store, pool, _dir) = test_store().await;
    let queue = job_queue(&pool);
    let job = JobKind::Capture(CaptureJob {
        url: ROOT.to_string(),
        capture_id: "abc123".to_string(),
    });

    let without = worker(&web, store.clone(), &queue, None, None);
    queue.enqueue(&job, EnqueueOptions::default()).await.unwrap();
    let report = without.run_once().await.unwrap().unwrap();
    assert_eq!(report.kind, "capture");
    assert!(!report.succeeded);
    assert_eq!(queue.status_of(&report.job_id).await.unwrap(), Some(JobStatus::Failed));

    let renderer = RecordingCapture::new();
    let with = worker(&web, store, &queue, None, Some(renderer.clone()));
    queue.enqueue(&job, EnqueueOptions::default()).await.unwrap();
    let report = with.run_once().await.unwrap().unwrap();
    assert!(report.succeeded);
    assert_eq!(
        renderer.captured(),
        vec![(ROOT.to_string(), "abc123".to_string())]
    );
}

#[tokio::test]
async fn test_queued_capture_round_trip() {
    let web = FakeWeb::new();
    web.page(ROOT, 200, &html_page("Shot", ""));
    let (store, pool, _dir) = test_store().await;
    let queue = job_queue(&pool);
    let renderer = RecordingCapture::new();
    let deferred: Arc<dyn ScreenshotCapture> =
        Arc::new(QueuedCapture::new(queue.clone(), EnqueueOptions::default()));
    let worker = worker(&web, store.clone(), &queue, Some(deferred), Some(renderer.clone()));

    queue
        .enqueue(
            &JobKind::Crawl(CrawlRequest::seed(ROOT, 0).into()),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    // The crawl enqueues the capture, which the same worker then renders.
    assert_eq!(worker.drain().await.unwrap(), 2);

    let doc = store.find_by_url(ROOT).await.unwrap().unwrap();
    let captured = renderer.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(doc.capture_id.as_deref(), Some(captured[0].1.as_str()));
}

#[tokio::test]
async fn test_seed_file_to_documents() {
    let web = FakeWeb::new();
    site(&web);
    web.page("https://example.com/", 200, &html_page("Clear", ""));
    let (store, pool, _dir) = test_store().await;
    let queue = job_queue(&pool);
    let worker = worker(&web, store.clone(), &queue, None, None);

    let seeds = load_seeds("# list\nexample.onion\nhttps://example.com/\nexample.onion\n", false);
    assert_eq!(seeds, vec![ROOT.to_string(), "https://example.com/".to_string()]);

    let report = submit_seeds(queue.as_ref(), &seeds, 0, false, EnqueueOptions::default()).await;
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.failed, 0);

    assert_eq!(worker.drain().await.unwrap(), 2);
    assert_eq!(store.count().await.unwrap(), 2);
    let clear = store.find_by_url("https://example.com/").await.unwrap().unwrap();
    assert!(!clear.is_onion);
    assert_eq!(clear.title.as_deref(), Some("Clear"));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let web = FakeWeb::new();
    site(&web);
    let (store, pool, _dir) = test_store().await;
    let queue = job_queue(&pool);
    let worker = worker(&web, store.clone(), &queue, None, None);

    queue
        .enqueue(
            &JobKind::Crawl(CrawlRequest::seed(ROOT, 1).into()),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let stopper = async {
        for _ in 0..200 {
            if store.count().await.unwrap() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(true).unwrap();
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(worker.run(rx), stopper)
    })
    .await
    .expect("worker stops after shutdown");

    assert_eq!(store.count().await.unwrap(), 3);
}
