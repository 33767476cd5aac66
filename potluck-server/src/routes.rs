use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use potluck::basic_models::{
    CommentForUpload, Created, RecipeDetail, RecipeForUpload, RecipeSummary, RecipeUpdate,
    Recommendations, RecommendQuery, StagedImage, TempImageForUpload, Toggled,
};
use rusqlite::TransactionBehavior;

use crate::{
    auth::CurrentUser,
    cache::{MediaCache, MediaKey},
    database::Database,
    drafts,
    errors::{JsonBody, WebError, WebResult},
    models::{Category, Comment, Interaction, Listing, Reaction, Recipe, SummaryRow, User},
    publish::Publisher,
    storage::SharedBlobStore,
};

/// Base64 grows a payload by a third; leave room for the rest of the JSON body
pub const STAGE_BODY_LIMIT: usize = drafts::MAX_IMAGE_BYTES / 3 * 4 + (1 << 20);

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub blobs: SharedBlobStore,
    pub bucket_root: Arc<str>,
    pub cache: MediaCache,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // `GET /health` goes to `health`
        .route("/health", get(health))
        // `POST /recipes/temp-image` stages an image into the caller's draft
        .route(
            "/recipes/temp-image",
            post(stage_image).layer(DefaultBodyLimit::max(STAGE_BODY_LIMIT)),
        )
        // `POST /recipes` publishes the draft, `PUT /recipes` edits a recipe
        .route("/recipes", post(publish_recipe).put(update_recipe))
        .route("/recipes/recent", get(recent_recipes))
        .route("/recipes/recommend", post(recommend_recipes))
        .route("/recipes/category/:category", get(list_category))
        .route("/recipes/search/:keyword", get(search_recipes))
        .route("/recipes/:recipe_id", get(get_recipe).delete(delete_recipe))
        .route("/recipes/:recipe_id/like", post(toggle_like))
        .route("/recipes/:recipe_id/bookmark", post(toggle_bookmark))
        .route("/recipes/:recipe_id/comments", post(add_comment))
        // `GET /media/*key` serves staged and published images
        .route("/media/*key", get(get_media))
        .with_state(state)
}

/// Run blocking work (database transactions, blob storage) off the async executor
async fn blocking<T, F>(work: F) -> WebResult<T>
where
    F: FnOnce() -> WebResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("Blocking task panicked")?
}

/// Delete blobs nobody points at anymore, logging rather than failing
fn forget_blobs(blobs: &SharedBlobStore, cache: &MediaCache, keys: &[String]) {
    for key in keys {
        cache.remove(&MediaKey(key.clone()));
        if let Err(e) = blobs.delete(key) {
            tracing::warn!("Could not delete blob {}: {:#}", key, e);
        }
    }
}

fn no_recipe(recipe_id: i64) -> WebError {
    WebError::NotFound(format!("No recipe with id {recipe_id}"))
}

/// Load a recipe the user is about to change, checking they are allowed to
fn modifiable_recipe(db: &Database, user_id: i64, recipe_id: i64) -> WebResult<Recipe> {
    let recipe = Recipe::get_by_id(db, recipe_id)?.ok_or_else(|| no_recipe(recipe_id))?;
    if !User::can_modify(db, user_id, &recipe)? {
        return Err(WebError::Forbidden);
    }
    Ok(recipe)
}

fn summaries(state: &AppState, rows: Vec<SummaryRow>) -> Vec<RecipeSummary> {
    rows.into_iter()
        .map(|row| row.into_summary(state.blobs.as_ref()))
        .collect()
}

// Just reply that everything is okay
async fn health() -> StatusCode {
    StatusCode::OK
}

/// Stage a main or step image into the caller's draft
async fn stage_image(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(upload): JsonBody<TempImageForUpload>,
) -> WebResult<(StatusCode, Json<StagedImage>)> {
    tracing::debug!(user_id, ?upload, "Staging image");
    let staged = blocking(move || {
        drafts::stage_image(
            &state.db,
            state.blobs.as_ref(),
            &state.bucket_root,
            user_id,
            upload,
        )
        .map_err(Into::into)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(staged)))
}

/// Publish the caller's open draft as a new recipe
async fn publish_recipe(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(upload): JsonBody<RecipeForUpload>,
) -> WebResult<(StatusCode, Json<Created>)> {
    let recipe_id = blocking(move || {
        Publisher::new(&state.db, state.blobs.as_ref(), &state.bucket_root)
            .publish(user_id, &upload)
            .map_err(Into::into)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(Created { id: recipe_id })))
}

/// Edit an existing recipe
async fn update_recipe(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(update): JsonBody<RecipeUpdate>,
) -> WebResult<Json<Created>> {
    let (Some(recipe_id), Some(ingredients), Some(steps)) =
        (update.id, update.recipe_ingredients, update.steps)
    else {
        return Err(WebError::InvalidInput(
            "Recipe id, ingredients and steps are required".into(),
        ));
    };
    let category = update
        .category
        .as_deref()
        .map(|c| {
            c.parse::<Category>()
                .map_err(|_| WebError::InvalidInput(format!("Unknown category: {c}")))
        })
        .transpose()?;
    let title = update.title.map(|t| t.trim().to_string());
    if title.as_deref().is_some_and(str::is_empty) {
        return Err(WebError::InvalidInput("Title cannot be empty".into()));
    }
    let intro = update.intro;

    blocking(move || {
        modifiable_recipe(&state.db, user_id, recipe_id)?;
        let mut conn = state.db.pool.get().context("Getting a database connection")?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Starting update")?;
        let dropped = Recipe::apply_update(
            &tx,
            recipe_id,
            title.as_deref(),
            category,
            intro.as_deref(),
            &ingredients,
            &steps,
        )?;
        tx.commit().context("Committing update")?;
        tracing::info!(user_id, recipe_id, "Updated recipe");
        forget_blobs(&state.blobs, &state.cache, &dropped);
        Ok(())
    })
    .await?;
    Ok(Json(Created { id: recipe_id }))
}

/// The full recipe page. Viewing a recipe is remembered for the recently viewed list.
async fn get_recipe(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<Json<RecipeDetail>> {
    let detail = blocking(move || {
        let detail = Recipe::get_detail(&state.db, state.blobs.as_ref(), user_id, recipe_id)?
            .ok_or_else(|| no_recipe(recipe_id))?;
        Interaction::record(&state.db, user_id, recipe_id)?;
        Ok(detail)
    })
    .await?;
    Ok(Json(detail))
}

async fn delete_recipe(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<Json<Created>> {
    blocking(move || {
        modifiable_recipe(&state.db, user_id, recipe_id)?;
        let keys = Recipe::delete(&state.db, recipe_id)?.unwrap_or_default();
        tracing::info!(user_id, recipe_id, blobs = keys.len(), "Deleted recipe");
        forget_blobs(&state.blobs, &state.cache, &keys);
        Ok(())
    })
    .await?;
    Ok(Json(Created { id: recipe_id }))
}

async fn list_category(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(category): Path<String>,
) -> WebResult<Json<Vec<RecipeSummary>>> {
    let listing: Listing = category
        .parse()
        .map_err(|_| WebError::NotFound(format!("Unknown category: {category}")))?;
    let recipes = blocking(move || {
        let rows = Recipe::list(&state.db, user_id, listing)?;
        Ok(summaries(&state, rows))
    })
    .await?;
    Ok(Json(recipes))
}

async fn search_recipes(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(keyword): Path<String>,
) -> WebResult<Json<Vec<RecipeSummary>>> {
    let keyword = keyword.trim().to_string();
    if keyword.is_empty() {
        return Err(WebError::InvalidInput("Search keyword is required".into()));
    }
    let recipes = blocking(move || {
        let rows = Recipe::search(&state.db, user_id, &keyword)?;
        if rows.is_empty() {
            return Err(WebError::NotFound(format!("No recipes match {keyword}")));
        }
        Ok(summaries(&state, rows))
    })
    .await?;
    Ok(Json(recipes))
}

async fn recommend_recipes(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(query): JsonBody<RecommendQuery>,
) -> WebResult<Json<Recommendations>> {
    let found =
        blocking(move || Ok(Recipe::recommend(&state.db, user_id, &query.ingredients)?)).await?;
    Ok(Json(found))
}

async fn recent_recipes(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> WebResult<Json<Vec<RecipeSummary>>> {
    let recipes = blocking(move || {
        let rows = Recipe::recent(&state.db, user_id)?;
        Ok(summaries(&state, rows))
    })
    .await?;
    Ok(Json(recipes))
}

async fn toggle_reaction(
    state: AppState,
    reaction: Reaction,
    user_id: i64,
    recipe_id: i64,
) -> WebResult<Json<Toggled>> {
    let toggled = blocking(move || {
        Recipe::get_by_id(&state.db, recipe_id)?.ok_or_else(|| no_recipe(recipe_id))?;
        Ok(reaction.toggle(&state.db, recipe_id, user_id)?)
    })
    .await?;
    Ok(Json(toggled))
}

async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<Json<Toggled>> {
    toggle_reaction(state, Reaction::Like, user_id, recipe_id).await
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<Json<Toggled>> {
    toggle_reaction(state, Reaction::Bookmark, user_id, recipe_id).await
}

async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(recipe_id): Path<i64>,
    JsonBody(upload): JsonBody<CommentForUpload>,
) -> WebResult<(StatusCode, Json<Created>)> {
    let comment = upload.comment.trim().to_string();
    if comment.is_empty() {
        return Err(WebError::InvalidInput("Comment cannot be empty".into()));
    }
    let id = blocking(move || {
        Recipe::get_by_id(&state.db, recipe_id)?.ok_or_else(|| no_recipe(recipe_id))?;
        Ok(Comment::push(&state.db, recipe_id, user_id, &comment)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// Serve an image out of blob storage, through the media cache
async fn get_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> WebResult<impl IntoResponse> {
    let content_type = image::ImageFormat::from_path(&key)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    let cache_key = MediaKey(key.clone());
    let bytes = match state.cache.get(&cache_key) {
        Some(bytes) => bytes,
        None => {
            let blobs = state.blobs.clone();
            let bytes = blocking(move || {
                blobs
                    .read(&key)
                    .map_err(|_| WebError::NotFound(format!("No media at {key}")))
            })
            .await?;
            let bytes = Arc::new(bytes);
            state.cache.insert(cache_key, bytes.clone());
            bytes
        }
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes.as_ref().clone()))
}
