use anyhow::Result;
use chatlist::animation::shared_render_cache;
use chatlist::budget;
use chatlist::config::load_or_default;
use chatlist::controller::MessageListController;
use chatlist::gallery::GalleryPreloadWindow;
use chatlist::image_cache::{self, ImageCacheConfig};
use chatlist::lifecycle::{AppLifecycle, LifecycleAware};
use chatlist::scroll_coordinator::{ScrollError, ScrollSurface};
use chatlist::{MessageRef, decode::ImageRequest};
use chatlist_ureq_http_client::UreqHttpClient;
use chrono::Local;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

// Simulates a chat list receiving a growing stream of messages, and
// optionally pages through a gallery of remote images.
//
// Usage:
//   cargo run -- --messages 5000 --batch 500
//   cargo run -- --config list.json --image-url https://example.com/a.jpg --image-url https://example.com/b.jpg

#[derive(Parser, Debug)]
#[command(name = "chatlist-demo", about = "Exercise the chat list rendering core")]
struct Args {
    /// JSON file with list configuration overrides.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Total number of messages to stream in.
    #[arg(short, long, default_value_t = 2000)]
    messages: usize,

    /// Messages added per update.
    #[arg(short, long, default_value_t = 250)]
    batch: usize,

    /// Id of the local user; their messages trigger auto-scroll.
    #[arg(long, default_value = "local-user")]
    local_user: String,

    /// Images to page through in the gallery demo.
    #[arg(long = "image-url")]
    image_urls: Vec<String>,
}

struct LoggingSurface;

impl ScrollSurface for LoggingSurface {
    fn scroll_to_start(&self) -> Result<(), ScrollError> {
        info!(target: "ChatList/Scroll", "Scrolled list to the newest message");
        Ok(())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build tokio runtime: {e}");
            return;
        }
    };

    rt.block_on(async {
        tokio::select! {
            result = run(args) => {
                if let Err(e) = result {
                    error!("Demo failed: {e:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down.");
            }
        }
    });
}

async fn run(args: Args) -> Result<()> {
    let config = load_or_default(args.config.as_deref()).await?;
    info!("Using {config:?}");

    let budget = budget::global();
    budget.set_ceiling(config.max_memory_bytes());
    let lifecycle = AppLifecycle::new(Arc::clone(&budget));

    let controller = MessageListController::new(
        &config,
        shared_render_cache::<String>(config.max_cache_size),
        args.local_user.clone(),
        Arc::new(LoggingSurface),
    );

    let batch = args.batch.max(1);
    let mut items = vec![MessageRef::anonymous("typing-spacer")];
    let mut next_id = 0usize;
    while next_id < args.messages {
        let count = batch.min(args.messages - next_id);
        let incoming = (next_id..next_id + count).map(|i| {
            let author = if i % 3 == 0 { args.local_user.as_str() } else { "peer" };
            MessageRef::new(format!("msg-{i}"), author)
        });
        // Newest first, after the spacer.
        let mut fresh: Vec<MessageRef> = incoming.collect();
        fresh.reverse();
        items.splice(1..1, fresh);
        next_id += count;

        let diff = controller.update(items.clone()).await;
        for item in items.iter().skip(1).take(20) {
            controller.render(item, |m| format!("<bubble {}>", m.id));
        }
        info!(
            target: "ChatList/Diff",
            "{} items: +{} -{}, animating newest: {}",
            items.len(),
            diff.added.len(),
            diff.removed.len(),
            items.get(1).is_some_and(|m| controller.is_animating(&m.id))
        );
    }
    info!("List stats: {}", serde_json::to_string(&controller.stats())?);

    if !args.image_urls.is_empty() {
        let cache = image_cache::init_global(
            Arc::new(UreqHttpClient::new()),
            ImageCacheConfig::from(&config),
        );
        let pages: Vec<ImageRequest> = args.image_urls.iter().map(ImageRequest::new).collect();
        let gallery = GalleryPreloadWindow::from_config(Arc::clone(&cache), pages, &config);

        let cache_participant = Arc::downgrade(&cache);
        let cache_participant: Weak<dyn LifecycleAware> = cache_participant;
        let gallery_participant = Arc::downgrade(&gallery);
        let gallery_participant: Weak<dyn LifecycleAware> = gallery_participant;
        lifecycle.register(cache_participant);
        lifecycle.register(gallery_participant);

        for center in 0..gallery.len() {
            gallery.set_center(center);
            tokio::time::sleep(Duration::from_millis(500)).await;
            info!(
                target: "ChatList/Gallery",
                "Page {center}: holding {:?}, state {:?}",
                gallery.held_indices(),
                gallery.state()
            );
        }
        info!("Image stats: {}", serde_json::to_string(&cache.stats())?);

        lifecycle.on_background();
        info!("Backgrounded, image stats: {}", serde_json::to_string(&cache.stats())?);
        lifecycle.on_foreground();
        gallery.teardown();
    } else {
        info!("No --image-url given, skipping the gallery demo");
    }

    controller.teardown();
    Ok(())
}
