use std::sync::Mutex;

use anyhow::Result;
use base64::Engine;
use potluck::basic_models::{IngredientForUpload, RecipeForUpload, Status, TempImageForUpload};
use potluck_server::database::Database;
use potluck_server::drafts::{self, Draft, StageError};
use potluck_server::models::{Listing, Reaction, Recipe};
use potluck_server::publish::{PublishError, Publisher};
use potluck_server::storage::{BlobStore, LocalBlobStore};
use rusqlite::params;
use tempfile::TempDir;

const BUCKET_ROOT: &str = "media";
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

struct Kitchen {
    dir: TempDir,
    db: Database,
    blobs: LocalBlobStore,
}

impl Kitchen {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("potluck.db")).unwrap();
        let blobs = LocalBlobStore::new(dir.path().join("blobs"), "/media").unwrap();
        db.pool
            .get()
            .unwrap()
            .execute_batch(
                "INSERT INTO User (user_id, nickname, is_staff) VALUES
                    (1, 'gochujang', 0),
                    (2, 'doenjang', 0),
                    (9, 'moderator', 1);",
            )
            .unwrap();
        Self {
            dir,
            db,
            blobs,
        }
    }

    fn stage(&self, user_id: i64, kind: &str, order: Option<i64>) -> Result<i64, StageError> {
        stage_into(&self.db, &self.blobs, user_id, kind, order)
    }

    fn publish(&self, user_id: i64, upload: &RecipeForUpload) -> Result<i64, PublishError> {
        Publisher::new(&self.db, &self.blobs, BUCKET_ROOT).publish(user_id, upload)
    }

    fn open_draft(&self, user_id: i64) -> Option<Draft> {
        Draft::find_open(&self.db.pool.get().unwrap(), user_id).unwrap()
    }

    fn count(&self, table: &str) -> i64 {
        self.db
            .pool
            .get()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn step_images(&self, recipe_id: i64) -> Vec<(i64, Option<String>)> {
        let conn = self.db.pool.get().unwrap();
        let mut stmt = conn
            .prepare("SELECT step_order, image FROM RecipeStep WHERE recipe_id = ? ORDER BY step_order")
            .unwrap();
        stmt.query_map(params![recipe_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }
}

fn png_data_uri() -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(PNG_SIGNATURE)
    )
}

fn stage_into(
    db: &Database,
    blobs: &dyn BlobStore,
    user_id: i64,
    kind: &str,
    order: Option<i64>,
) -> Result<i64, StageError> {
    let upload = TempImageForUpload {
        image: Some(png_data_uri()),
        kind: Some(kind.into()),
        order,
    };
    drafts::stage_image(db, blobs, BUCKET_ROOT, user_id, upload).map(|staged| staged.id)
}

fn recipe(title: &str, steps: &[&str]) -> RecipeForUpload {
    RecipeForUpload {
        title: title.into(),
        category: "daily".into(),
        intro: Some("Good on a cold day".into()),
        recipe_ingredients: vec![
            IngredientForUpload {
                name: "kimchi".into(),
                quantity: "1".into(),
                unit: "cup".into(),
            },
            IngredientForUpload {
                name: "tofu".into(),
                quantity: "200".into(),
                unit: "g".into(),
            },
        ],
        steps: steps.iter().map(|s| s.to_string()).collect(),
    }
}

/// Keys under the blob directory, relative to it, sorted
fn blob_keys(kitchen: &Kitchen, prefix: &str) -> Vec<String> {
    let base = kitchen.dir.path().join("blobs");
    let mut keys = vec![];
    let mut pending = vec![base.clone()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let key = path.strip_prefix(&base).unwrap().to_string_lossy().replace('\\', "/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
    }
    keys.sort();
    keys
}

#[test]
fn main_images_share_one_draft() {
    let kitchen = Kitchen::new();
    let first = kitchen.stage(1, "main", None).unwrap();
    let second = kitchen.stage(1, "main", None).unwrap();
    assert_eq!(first, second);
    assert_eq!(kitchen.count("Draft"), 1);
    let draft = kitchen.open_draft(1).unwrap();
    assert!(draft.main_image.unwrap().starts_with("media/temp/1/main-"));
}

#[test]
fn step_images_need_an_open_draft() {
    let kitchen = Kitchen::new();
    assert!(matches!(
        kitchen.stage(1, "step", Some(1)),
        Err(StageError::NoOpenDraft)
    ));
    assert!(blob_keys(&kitchen, "media/temp").is_empty());
    assert!(matches!(
        kitchen.stage(1, "side", None),
        Err(StageError::InvalidInput(_))
    ));
}

#[test]
fn restaging_a_step_replaces_the_image() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    let first = kitchen.stage(1, "step", Some(2)).unwrap();
    let second = kitchen.stage(1, "step", Some(2)).unwrap();
    assert_eq!(first, second);
    assert_eq!(kitchen.count("DraftStepImage"), 1);
}

#[test]
fn step_images_follow_their_positions() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    kitchen.stage(1, "step", Some(1)).unwrap();
    kitchen.stage(1, "step", Some(3)).unwrap();

    let recipe_id = kitchen
        .publish(1, &recipe("Kimchi stew", &["chop", "boil", "serve"]))
        .unwrap();

    let steps = kitchen.step_images(recipe_id);
    assert_eq!(steps.len(), 3);
    let prefix = format!("media/recipe/{recipe_id}/step_");
    assert!(steps[0].1.as_deref().unwrap().starts_with(&format!("{prefix}1-")));
    assert_eq!(steps[1].1, None);
    assert!(steps[2].1.as_deref().unwrap().starts_with(&format!("{prefix}3-")));

    let stored = Recipe::get_by_id(&kitchen.db, recipe_id).unwrap().unwrap();
    assert!(stored
        .main_image
        .unwrap()
        .starts_with(&format!("media/recipe/{recipe_id}/main-")));
    assert_eq!(blob_keys(&kitchen, &format!("media/recipe/{recipe_id}")).len(), 3);
}

#[test]
fn images_beyond_the_last_step_stay_in_staging() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    for order in 1..=4 {
        kitchen.stage(1, "step", Some(order)).unwrap();
    }

    let recipe_id = kitchen.publish(1, &recipe("Tofu", &["a", "b"])).unwrap();

    let steps = kitchen.step_images(recipe_id);
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|(_, image)| image.is_some()));
    let published = blob_keys(&kitchen, &format!("media/recipe/{recipe_id}"));
    // main plus two steps
    assert_eq!(published.len(), 3);
    assert!(published.iter().all(|key| !key.contains("step_3") && !key.contains("step_4")));
    assert_eq!(blob_keys(&kitchen, "media/temp/1").len(), 5);
}

#[test]
fn publishing_closes_the_draft() {
    let kitchen = Kitchen::new();
    let draft_id = kitchen.stage(1, "main", None).unwrap();
    let recipe_id = kitchen.publish(1, &recipe("Bibimbap", &["mix"])).unwrap();

    assert!(kitchen.open_draft(1).is_none());
    let closed = Draft::get_by_id(&kitchen.db.pool.get().unwrap(), draft_id)
        .unwrap()
        .unwrap();
    assert_eq!(closed.recipe_id, Some(recipe_id));

    // The next upload starts a fresh draft
    let next = kitchen.stage(1, "main", None).unwrap();
    assert_ne!(next, draft_id);
    let step = kitchen.stage(1, "step", Some(1)).unwrap();
    let images = Draft::step_images(&kitchen.db.pool.get().unwrap(), next).unwrap();
    assert_eq!(images[0].draft_step_image_id, step);
}

#[test]
fn consecutive_publishes_do_not_share_images() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    kitchen.stage(1, "step", Some(1)).unwrap();
    let first = kitchen.publish(1, &recipe("First", &["one"])).unwrap();

    kitchen.stage(1, "main", None).unwrap();
    let second = kitchen.publish(1, &recipe("Second", &["one", "two"])).unwrap();

    assert_ne!(first, second);
    assert!(kitchen.step_images(first)[0].1.is_some());
    assert_eq!(kitchen.step_images(second), vec![(1, None), (2, None)]);
}

#[test]
fn drafts_belong_to_their_user() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    assert!(matches!(
        kitchen.stage(2, "step", Some(1)),
        Err(StageError::NoOpenDraft)
    ));
    assert!(matches!(
        kitchen.publish(2, &recipe("Not mine", &["x"])),
        Err(PublishError::NoOpenDraft)
    ));
    assert!(kitchen.open_draft(1).is_some());
}

#[test]
fn invalid_uploads_leave_the_draft_open() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    let mut bad = recipe("  ", &["x"]);
    assert!(matches!(
        kitchen.publish(1, &bad),
        Err(PublishError::InvalidInput(_))
    ));
    bad.title = "Soup".into();
    bad.category = "brunch".into();
    assert!(matches!(
        kitchen.publish(1, &bad),
        Err(PublishError::InvalidInput(_))
    ));
    assert!(kitchen.open_draft(1).is_some());
    assert_eq!(kitchen.count("Recipe"), 0);
}

/// Local storage that refuses to copy after a set number of copies
struct FlakyStore {
    inner: LocalBlobStore,
    copies_left: Mutex<usize>,
}

impl BlobStore for FlakyStore {
    fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        self.inner.put(key, content)
    }

    fn copy(&self, source: &str, destination: &str) -> Result<()> {
        let mut left = self.copies_left.lock().unwrap();
        anyhow::ensure!(*left > 0, "bucket is unavailable");
        *left -= 1;
        self.inner.copy(source, destination)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.read(key)
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }
}

#[test]
fn failed_publish_leaves_nothing_behind() {
    let kitchen = Kitchen::new();
    let flaky = FlakyStore {
        inner: LocalBlobStore::new(kitchen.dir.path().join("blobs"), "/media").unwrap(),
        copies_left: Mutex::new(1),
    };
    stage_into(&kitchen.db, &flaky, 1, "main", None).unwrap();
    stage_into(&kitchen.db, &flaky, 1, "step", Some(1)).unwrap();

    let result = Publisher::new(&kitchen.db, &flaky, BUCKET_ROOT)
        .publish(1, &recipe("Doomed", &["one"]));

    let message = match result {
        Err(PublishError::Failed(message)) => message,
        other => panic!("publish should have failed, got {other:?}"),
    };
    assert!(message.contains("bucket is unavailable"), "{message}");
    assert_eq!(kitchen.count("Recipe"), 0);
    assert_eq!(kitchen.count("RecipeStep"), 0);
    assert_eq!(kitchen.count("RecipeIngredient"), 0);
    assert!(blob_keys(&kitchen, "media/recipe").is_empty());

    // The draft is untouched, so publishing again once storage recovers works
    assert!(kitchen.open_draft(1).is_some());
    let recipe_id = kitchen.publish(1, &recipe("Doomed", &["one"])).unwrap();
    assert!(kitchen.step_images(recipe_id)[0].1.is_some());
}

#[test]
fn reactions_show_up_in_listings() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    let recipe_id = kitchen.publish(1, &recipe("Japchae", &["stir"])).unwrap();

    let toggled = Reaction::Like.toggle(&kitchen.db, recipe_id, 2).unwrap();
    assert_eq!((toggled.status, toggled.count), (Status::Active, 1));
    Reaction::Bookmark.toggle(&kitchen.db, recipe_id, 2).unwrap();
    let toggled = Reaction::Bookmark.toggle(&kitchen.db, recipe_id, 2).unwrap();
    assert_eq!((toggled.status, toggled.count), (Status::Inactive, 0));

    let liked = Recipe::list(&kitchen.db, 2, Listing::Liked).unwrap();
    assert_eq!(liked.len(), 1);
    let summary = liked.into_iter().next().unwrap().into_summary(&kitchen.blobs);
    assert_eq!(summary.like_status, Status::Active);
    assert_eq!(summary.book_status, Status::Inactive);
    assert_eq!(summary.user.as_deref(), Some("gochujang"));
    assert!(summary.main_image.unwrap().starts_with("/media/media/recipe/"));

    // Someone else sees the count but not the flag
    let daily = Recipe::list(&kitchen.db, 1, "daily".parse().unwrap()).unwrap();
    assert_eq!(daily[0].likes, 1);
    assert!(!daily[0].liked);
    assert!(Recipe::list(&kitchen.db, 1, Listing::Bookmarked).unwrap().is_empty());
}

#[test]
fn search_and_recommend_by_ingredient() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    let stew = kitchen.publish(1, &recipe("Stew", &["simmer the broth"])).unwrap();

    assert_eq!(Recipe::search(&kitchen.db, 2, "tofu").unwrap().len(), 1);
    assert_eq!(Recipe::search(&kitchen.db, 2, "broth").unwrap().len(), 1);
    assert!(Recipe::search(&kitchen.db, 2, "100%").unwrap().is_empty());

    let tofu_id: i64 = kitchen
        .db
        .pool
        .get()
        .unwrap()
        .query_row("SELECT ingredient_id FROM Ingredient WHERE name = 'tofu'", [], |row| {
            row.get(0)
        })
        .unwrap();
    let found = Recipe::recommend(&kitchen.db, 2, &[tofu_id]).unwrap();
    assert_eq!(found.ingredients, vec!["tofu".to_string()]);
    assert_eq!(found.recipes.len(), 1);
    assert_eq!(found.recipes[0].recipe_id, stew);
    assert_eq!(found.recipes[0].include_ingredients, vec!["tofu".to_string()]);
    assert_eq!(found.recipes[0].not_include_ingredients, vec!["kimchi".to_string()]);
}

#[test]
fn recently_viewed_is_distinct_and_newest_first() {
    let kitchen = Kitchen::new();
    let mut ids = vec![];
    for title in ["a", "b", "c"] {
        kitchen.stage(1, "main", None).unwrap();
        ids.push(kitchen.publish(1, &recipe(title, &["x"])).unwrap());
    }
    for id in [ids[0], ids[1], ids[0], ids[2], ids[0]] {
        potluck_server::models::Interaction::record(&kitchen.db, 2, id).unwrap();
    }
    let recent: Vec<i64> = Recipe::recent(&kitchen.db, 2)
        .unwrap()
        .into_iter()
        .map(|row| row.recipe_id)
        .collect();
    assert_eq!(recent, vec![ids[0], ids[2], ids[1]]);
    assert!(Recipe::recent(&kitchen.db, 1).unwrap().is_empty());
}

#[test]
fn detail_reflects_the_viewer() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    let recipe_id = kitchen.publish(1, &recipe("Tteokbokki", &["heat", "stir"])).unwrap();
    potluck_server::models::Comment::push(&kitchen.db, recipe_id, 2, "Spicy!").unwrap();

    let own = Recipe::get_detail(&kitchen.db, &kitchen.blobs, 1, recipe_id)
        .unwrap()
        .unwrap();
    assert_eq!(own.can_update, 1);
    assert_eq!(own.ingredients.len(), 2);
    assert_eq!(own.steps.len(), 2);
    assert_eq!(own.comments[0].can_update, 0);
    assert_eq!(own.user.nickname.as_deref(), Some("gochujang"));

    let commenter = Recipe::get_detail(&kitchen.db, &kitchen.blobs, 2, recipe_id)
        .unwrap()
        .unwrap();
    assert_eq!(commenter.can_update, 0);
    assert_eq!(commenter.comments[0].can_update, 1);

    let staff = Recipe::get_detail(&kitchen.db, &kitchen.blobs, 9, recipe_id)
        .unwrap()
        .unwrap();
    assert_eq!(staff.can_update, 1);
    assert!(Recipe::get_detail(&kitchen.db, &kitchen.blobs, 1, recipe_id + 100)
        .unwrap()
        .is_none());
}

#[test]
fn updates_keep_surviving_step_images() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    kitchen.stage(1, "step", Some(1)).unwrap();
    kitchen.stage(1, "step", Some(3)).unwrap();
    let recipe_id = kitchen.publish(1, &recipe("Mandu", &["fold", "steam", "dip"])).unwrap();
    let before = kitchen.step_images(recipe_id);

    let mut conn = kitchen.db.pool.get().unwrap();
    let tx = conn.transaction().unwrap();
    let dropped = Recipe::apply_update(
        &tx,
        recipe_id,
        Some("Fried mandu"),
        None,
        None,
        &[IngredientForUpload {
            name: "dumplings".into(),
            quantity: "12".into(),
            unit: String::new(),
        }],
        &["fold".to_string(), "fry".to_string()],
    )
    .unwrap();
    tx.commit().unwrap();
    drop(conn);

    assert_eq!(dropped, vec![before[2].1.clone().unwrap()]);
    let after = kitchen.step_images(recipe_id);
    assert_eq!(after, vec![before[0].clone(), (2, None)]);
    let stored = Recipe::get_by_id(&kitchen.db, recipe_id).unwrap().unwrap();
    assert_eq!(stored.title, "Fried mandu");
    assert_eq!(stored.category, "daily");
    assert_eq!(stored.get_ingredients(&kitchen.db).unwrap().len(), 1);
}

#[test]
fn deleting_returns_every_blob() {
    let kitchen = Kitchen::new();
    kitchen.stage(1, "main", None).unwrap();
    kitchen.stage(1, "step", Some(1)).unwrap();
    let recipe_id = kitchen.publish(1, &recipe("Gone", &["one", "two"])).unwrap();
    Reaction::Like.toggle(&kitchen.db, recipe_id, 2).unwrap();

    let mut keys = Recipe::delete(&kitchen.db, recipe_id).unwrap().unwrap();
    keys.sort();
    assert_eq!(keys, blob_keys(&kitchen, &format!("media/recipe/{recipe_id}")));
    assert_eq!(kitchen.count("Recipe"), 0);
    assert_eq!(kitchen.count("RecipeStep"), 0);
    assert_eq!(kitchen.count("RecipeLike"), 0);
    assert!(Recipe::delete(&kitchen.db, recipe_id).unwrap().is_none());
}
