use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    assets::{self, disk::UPLOADS_ROUTE, AssetSink, DiskSink, GcsSink, Upload},
    attachment::MAX_ATTACHMENTS,
    cli::{AssetTarget, Backend, ServeArgs},
    cursor::Cursor,
    error::BoardError,
    post::{NewPost, Post, PostId},
    store::{HybridStore, MemoryStore, PostStore, RedisStore},
};

const DEFAULT_BODY_LIMIT: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PostStore>,
    pub assets: Arc<dyn AssetSink>,
}

/// Knobs for [`router`] that do not belong to the shared state.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub body_limit: usize,
    /// Directory served under `/uploads` when attachments live on local disk.
    pub uploads_dir: Option<PathBuf>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            body_limit: DEFAULT_BODY_LIMIT,
            uploads_dir: None,
        }
    }
}

pub fn router(state: AppState, options: RouterOptions) -> Router {
    let mut app = Router::new()
        .route("/", get(health_handler))
        .route("/post", post(create_post_handler))
        .route("/updateVote", post(update_vote_handler))
        .route("/updatePoll", post(update_poll_handler))
        .route("/getPosts", get(get_posts_handler))
        .route("/getNewPosts", get(get_new_posts_handler))
        .with_state(state);

    if let Some(dir) = options.uploads_dir {
        app = app.nest_service(UPLOADS_ROUTE, ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(options.body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Opens the configured backends, binds, and serves until ctrl-c or SIGTERM.
pub async fn run(args: ServeArgs) -> Result<()> {
    let store = open_store(&args).await?;
    let (assets, uploads_dir) = open_assets(&args).await?;

    let app = router(
        AppState { store, assets },
        RouterOptions {
            body_limit: args.body_limit_mb * 1024 * 1024,
            uploads_dir,
        },
    );

    let addr = args.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let server = Server::new(listener, app);
    info!("board listening on {}", server.local_addr()?);

    server.run_until_signal().await
}

async fn open_store(args: &ServeArgs) -> Result<Arc<dyn PostStore>> {
    let store: Arc<dyn PostStore> = match args.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Redis => Arc::new(connect_redis(args).await?),
        Backend::Hybrid => Arc::new(HybridStore::open(connect_redis(args).await?).await?),
    };

    info!(backend = ?args.backend, "post store ready");
    Ok(store)
}

async fn connect_redis(args: &ServeArgs) -> Result<RedisStore> {
    RedisStore::connect(&args.redis_url, &args.redis_namespace)
        .await
        .with_context(|| format!("failed to connect to {}", args.redis_url))
}

async fn open_assets(args: &ServeArgs) -> Result<(Arc<dyn AssetSink>, Option<PathBuf>)> {
    match args.assets {
        AssetTarget::Disk => {
            let sink = DiskSink::create(&args.asset_dir, &args.public_url).await?;
            let dir = sink.root().to_path_buf();
            Ok((Arc::new(sink), Some(dir)))
        }
        AssetTarget::Gcs => Ok((
            Arc::new(GcsSink::new(&args.gcs_bucket, args.gcs_token.clone())),
            None,
        )),
    }
}

pub struct Server {
    listener: TcpListener,
    app: Router,
}

impl Server {
    pub fn new(listener: TcpListener, app: Router) -> Self {
        Self { listener, app }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Server { listener, app } = self;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("server shut down");
        Ok(())
    }

    pub async fn run_until_signal(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                warn!(error = ?err, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostEnvelope {
    pub message: String,
    pub post: Post,
}

impl PostEnvelope {
    fn new(message: &str, post: Post) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
            post,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub post_id: PostId,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVoteRequest {
    pub post_id: PostId,
    pub option_index: i64,
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    since: Option<String>,
}

async fn health_handler() -> &'static str {
    "Backend is running"
}

async fn create_post_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PostEnvelope>, BoardError> {
    let multipart =
        multipart.map_err(|rejection| BoardError::MalformedRequest(rejection.body_text()))?;
    let form = CreateForm::read(multipart).await?;
    let uploads = form.uploads.len();

    let assets = assets::upload_all(state.assets.as_ref(), form.uploads).await?;
    let post = state
        .store
        .create(NewPost {
            body: form.body,
            assets,
            poll: form.poll,
            parent_id: form.parent_id,
            reply_depth: form.reply_depth,
        })
        .await?;

    info!(post_id = %post.id, uploads, "post accepted");
    Ok(PostEnvelope::new("Posted successfully", post))
}

async fn update_vote_handler(
    State(state): State<AppState>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<PostEnvelope>, BoardError> {
    let Json(request) = payload.map_err(malformed)?;
    let post = state
        .store
        .apply_vote(&request.post_id, request.amount)
        .await?;

    Ok(PostEnvelope::new("Vote updated", post))
}

async fn update_poll_handler(
    State(state): State<AppState>,
    payload: Result<Json<PollVoteRequest>, JsonRejection>,
) -> Result<Json<PostEnvelope>, BoardError> {
    let Json(request) = payload.map_err(malformed)?;
    let post = state
        .store
        .apply_poll_vote(&request.post_id, request.option_index)
        .await?;

    Ok(PostEnvelope::new("Poll updated", post))
}

async fn get_posts_handler(State(state): State<AppState>) -> Result<Json<Vec<Post>>, BoardError> {
    Ok(Json(state.store.list_all().await?))
}

async fn get_new_posts_handler(
    State(state): State<AppState>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<Vec<Post>>, BoardError> {
    let cursor = Cursor::parse(query.since.as_deref());
    Ok(Json(state.store.list_since(cursor).await?))
}

fn malformed(rejection: JsonRejection) -> BoardError {
    BoardError::MalformedRequest(rejection.body_text())
}

/// Fields of a `POST /post` multipart body.
#[derive(Debug, Default)]
struct CreateForm {
    body: Option<String>,
    uploads: Vec<Upload>,
    poll: Vec<String>,
    parent_id: Option<PostId>,
    reply_depth: i64,
}

impl CreateForm {
    async fn read(mut multipart: Multipart) -> Result<Self, BoardError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "files" | "files[]" => {
                    // Parts past the attachment limit are dropped unread.
                    if form.uploads.len() < MAX_ATTACHMENTS {
                        form.uploads.push(read_upload(field).await?);
                    }
                }
                "body" => form.body = Some(read_text(field).await?),
                "poll" | "poll[]" => form.poll.push(read_text(field).await?),
                "replyId" => {
                    let raw = read_text(field).await?;
                    form.parent_id = PostId::parse_parent(Some(raw.as_str()));
                }
                "replyLevel" => {
                    let raw = read_text(field).await?;
                    form.reply_depth = parse_reply_level(&raw)?;
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

async fn read_upload(field: Field<'_>) -> Result<Upload, BoardError> {
    let filename = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(multipart_error)?;

    Ok(Upload {
        filename,
        content_type,
        bytes,
    })
}

async fn read_text(field: Field<'_>) -> Result<String, BoardError> {
    field.text().await.map_err(multipart_error)
}

/// Absent or blank means depth 0; anything else must be an integer.
fn parse_reply_level(raw: &str) -> Result<i64, BoardError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse()
        .map_err(|_| BoardError::MalformedRequest(format!("replyLevel '{raw}' is not an integer")))
}

fn multipart_error(err: MultipartError) -> BoardError {
    BoardError::MalformedRequest(err.body_text())
}
