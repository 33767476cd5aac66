use crate::database::{collect_rows, sqlite_current_timestamp, Database, FromRow};
use crate::storage::BlobStore;
use anyhow::Result;
use potluck::basic_models::{
    CommentLine, IngredientForUpload, IngredientLine, RecipeAuthor, RecipeDetail,
    RecipeSummary, RecommendedRecipe, Recommendations, StepLine, Toggled,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

/// How many recently viewed recipes to return
pub const RECENT_LIMIT: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Daily,
    Healthy,
    Midnight,
    // Older clients spell it "desert"
    #[strum(to_string = "dessert", serialize = "desert")]
    Dessert,
}

/// What a category listing page is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Category(Category),
    Liked,
    Bookmarked,
}

impl std::str::FromStr for Listing {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Listing::Liked),
            "book" => Ok(Listing::Bookmarked),
            other => other.parse().map(Listing::Category),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Recipe {
    pub recipe_id: i64,
    pub user_id: i64,
    pub title: String,
    pub category: String,
    pub intro: Option<String>,
    pub main_image: Option<String>,
    pub created_on: String,
    pub updated_on: String,
}

impl FromRow for Recipe {
    /// Create a new recipe from an sql row, provided by rusqlite, using named columns.
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            recipe_id: row.get("recipe_id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            category: row.get("category")?,
            intro: row.get("intro")?,
            main_image: row.get("main_image")?,
            created_on: row.get("created_on")?,
            updated_on: row.get("updated_on")?,
        })
    }
}

/// Columns every summary query selects. `?1` is always the viewing user.
const SUMMARY_SELECT: &str = "
    SELECT Recipe.recipe_id, Recipe.title, Recipe.main_image, User.nickname,
        (SELECT COUNT(*) FROM RecipeLike WHERE recipe_id = Recipe.recipe_id) AS likes,
        EXISTS (SELECT 1 FROM RecipeLike WHERE recipe_id = Recipe.recipe_id AND user_id = ?1) AS liked,
        (SELECT COUNT(*) FROM Bookmark WHERE recipe_id = Recipe.recipe_id) AS bookmarks,
        EXISTS (SELECT 1 FROM Bookmark WHERE recipe_id = Recipe.recipe_id AND user_id = ?1) AS bookmarked
    FROM Recipe
    LEFT JOIN User ON User.user_id = Recipe.user_id";

/// A recipe with its counters, from the point of view of one user
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub recipe_id: i64,
    pub title: String,
    pub main_image: Option<String>,
    pub nickname: Option<String>,
    pub likes: i64,
    pub liked: bool,
    pub bookmarks: i64,
    pub bookmarked: bool,
}

impl FromRow for SummaryRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            recipe_id: row.get("recipe_id")?,
            title: row.get("title")?,
            main_image: row.get("main_image")?,
            nickname: row.get("nickname")?,
            likes: row.get("likes")?,
            liked: row.get("liked")?,
            bookmarks: row.get("bookmarks")?,
            bookmarked: row.get("bookmarked")?,
        })
    }
}

impl SummaryRow {
    pub fn into_summary(self, blobs: &dyn BlobStore) -> RecipeSummary {
        RecipeSummary {
            id: self.recipe_id,
            user: self.nickname,
            title: self.title,
            main_image: self.main_image.map(|key| blobs.public_url(&key)),
            like: self.likes,
            like_status: self.liked.into(),
            book: self.bookmarks,
            book_status: self.bookmarked.into(),
        }
    }
}

/// Escape `%`, `_` and `\` so a keyword matches literally inside a LIKE pattern
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Recipe {
    /// Insert the recipe row itself. Ingredients and steps are written separately.
    pub fn insert(
        conn: &Connection,
        user_id: i64,
        title: &str,
        category: Category,
        intro: Option<&str>,
    ) -> Result<i64> {
        let now = sqlite_current_timestamp();
        let category: &'static str = category.into();
        conn.execute(
            "INSERT INTO Recipe (user_id, title, category, intro, created_on, updated_on)
            VALUES (?, ?, ?, ?, ?, ?)",
            params![user_id, title, category, intro, now, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_main_image(conn: &Connection, recipe_id: i64, key: &str) -> Result<()> {
        conn.execute(
            "UPDATE Recipe SET main_image = ? WHERE recipe_id = ?",
            params![key, recipe_id],
        )?;
        Ok(())
    }

    /// Get a recipe by ID
    pub fn get_by_id(db: &Database, recipe_id: i64) -> Result<Option<Self>> {
        Ok(db
            .collect_rows("SELECT * FROM Recipe WHERE recipe_id = ?", params![recipe_id])?
            .pop())
    }

    /// Get all the steps for a recipe, in order
    pub fn get_steps(&self, db: &Database) -> Result<Vec<RecipeStep>> {
        db.collect_rows(
            "SELECT * FROM RecipeStep WHERE recipe_id = ? ORDER BY step_order",
            params![self.recipe_id],
        )
    }

    /// Get all the ingredients for a recipe, with their names
    pub fn get_ingredients(&self, db: &Database) -> Result<Vec<RecipeIngredient>> {
        db.collect_rows(
            "SELECT RecipeIngredient.*, Ingredient.name
            FROM RecipeIngredient
            JOIN Ingredient USING (ingredient_id)
            WHERE recipe_id = ?
            ORDER BY recipe_ingredient_id",
            params![self.recipe_id],
        )
    }

    /// Get all the comments for a recipe, oldest first
    pub fn get_comments(&self, db: &Database) -> Result<Vec<Comment>> {
        db.collect_rows(
            "SELECT Comment.*, User.nickname, User.profile_image
            FROM Comment
            LEFT JOIN User USING (user_id)
            WHERE recipe_id = ?
            ORDER BY comment_id",
            params![self.recipe_id],
        )
    }

    /// Summaries matching an arbitrary condition. `?1` in the condition is the viewer.
    fn summaries_where<P: rusqlite::Params>(
        db: &Database,
        condition: &str,
        parameters: P,
    ) -> Result<Vec<SummaryRow>> {
        db.collect_rows(
            &format!("{SUMMARY_SELECT} WHERE {condition} ORDER BY Recipe.recipe_id DESC"),
            parameters,
        )
    }

    /// List the recipes on a category page
    pub fn list(db: &Database, viewer: i64, listing: Listing) -> Result<Vec<SummaryRow>> {
        match listing {
            Listing::Category(category) => {
                let category: &'static str = category.into();
                Self::summaries_where(db, "Recipe.category = ?2", params![viewer, category])
            }
            Listing::Liked => Self::summaries_where(
                db,
                "EXISTS (SELECT 1 FROM RecipeLike WHERE recipe_id = Recipe.recipe_id AND user_id = ?1)",
                params![viewer],
            ),
            Listing::Bookmarked => Self::summaries_where(
                db,
                "EXISTS (SELECT 1 FROM Bookmark WHERE recipe_id = Recipe.recipe_id AND user_id = ?1)",
                params![viewer],
            ),
        }
    }

    /// Recipes whose title, ingredient names or step text contain the keyword
    pub fn search(db: &Database, viewer: i64, keyword: &str) -> Result<Vec<SummaryRow>> {
        Self::summaries_where(
            db,
            "Recipe.title LIKE ?2 ESCAPE '\\'
            OR EXISTS (
                SELECT 1 FROM RecipeIngredient JOIN Ingredient USING (ingredient_id)
                WHERE RecipeIngredient.recipe_id = Recipe.recipe_id AND Ingredient.name LIKE ?2 ESCAPE '\\')
            OR EXISTS (
                SELECT 1 FROM RecipeStep
                WHERE RecipeStep.recipe_id = Recipe.recipe_id AND RecipeStep.step LIKE ?2 ESCAPE '\\')",
            params![viewer, like_pattern(keyword)],
        )
    }

    /// The counters for a single recipe
    pub fn summary(db: &Database, viewer: i64, recipe_id: i64) -> Result<Option<SummaryRow>> {
        Ok(
            Self::summaries_where(db, "Recipe.recipe_id = ?2", params![viewer, recipe_id])?
                .pop(),
        )
    }

    /// The recipes the viewer looked at most recently, most recent first, without repeats
    pub fn recent(db: &Database, viewer: i64) -> Result<Vec<SummaryRow>> {
        let ids = Interaction::recent_recipe_ids(db, viewer, RECENT_LIMIT)?;
        let mut rows = Self::summaries_where(
            db,
            "Recipe.recipe_id IN (SELECT value FROM json_each(?2))",
            params![viewer, serde_json::to_string(&ids)?],
        )?;
        rows.sort_by_key(|row| ids.iter().position(|id| *id == row.recipe_id));
        Ok(rows)
    }

    /// Everything the recipe page shows, from the viewer's point of view
    pub fn get_detail(
        db: &Database,
        blobs: &dyn BlobStore,
        viewer: i64,
        recipe_id: i64,
    ) -> Result<Option<RecipeDetail>> {
        let Some(recipe) = Self::get_by_id(db, recipe_id)? else {
            return Ok(None);
        };
        let Some(counters) = Self::summary(db, viewer, recipe_id)? else {
            return Ok(None);
        };
        let viewer_is_staff = User::is_staff(db, viewer)?;
        let author = User::get_by_id(db, recipe.user_id)?;
        let ingredients = recipe
            .get_ingredients(db)?
            .into_iter()
            .map(|i| IngredientLine {
                id: i.recipe_ingredient_id,
                ingredient_id: i.ingredient_id,
                name: i.name,
                quantity: i.quantity,
                unit: i.unit,
            })
            .collect();
        let steps = recipe
            .get_steps(db)?
            .into_iter()
            .map(|s| StepLine {
                step: s.step,
                image: s.image.map(|key| blobs.public_url(&key)),
            })
            .collect();
        let comments = recipe
            .get_comments(db)?
            .into_iter()
            .map(|c| CommentLine {
                can_update: (viewer_is_staff || c.user_id == viewer) as u8,
                id: c.comment_id,
                user_id: c.user_id,
                user_nickname: c.nickname,
                profile_image: c.profile_image,
                updated_at: c.updated_on,
                comment: c.comment,
            })
            .collect();
        Ok(Some(RecipeDetail {
            id: recipe.recipe_id,
            can_update: (viewer_is_staff || recipe.user_id == viewer) as u8,
            title: recipe.title,
            category: recipe.category,
            intro: recipe.intro,
            main_image: recipe.main_image.map(|key| blobs.public_url(&key)),
            created_on: recipe.created_on,
            like: counters.likes,
            like_status: counters.liked.into(),
            book: counters.bookmarks,
            book_status: counters.bookmarked.into(),
            user: RecipeAuthor {
                id: recipe.user_id,
                nickname: author.as_ref().and_then(|a| a.nickname.clone()),
                profile_image: author.and_then(|a| a.profile_image),
                date: recipe.updated_on,
            },
            ingredients,
            steps,
            comments,
        }))
    }

    /// Recipes that use any of the given ingredients, with which of the recipe's
    /// ingredients were asked for and which were not.
    pub fn recommend(db: &Database, viewer: i64, ingredient_ids: &[i64]) -> Result<Recommendations> {
        let ids_json = serde_json::to_string(ingredient_ids)?;
        let wanted: Vec<Ingredient> = db.collect_rows(
            "SELECT * FROM Ingredient
            WHERE ingredient_id IN (SELECT value FROM json_each(?))
            ORDER BY ingredient_id",
            params![ids_json],
        )?;
        let wanted_names: Vec<String> = wanted.into_iter().map(|i| i.name).collect();
        let rows = Self::summaries_where(
            db,
            "EXISTS (
                SELECT 1 FROM RecipeIngredient
                WHERE recipe_id = Recipe.recipe_id
                AND ingredient_id IN (SELECT value FROM json_each(?2)))",
            params![viewer, ids_json],
        )?;
        let mut recipes = Vec::with_capacity(rows.len());
        for row in rows {
            let recipe_names: Vec<String> = db
                .collect_rows::<RecipeIngredient, _>(
                    "SELECT RecipeIngredient.*, Ingredient.name
                    FROM RecipeIngredient
                    JOIN Ingredient USING (ingredient_id)
                    WHERE recipe_id = ?
                    ORDER BY recipe_ingredient_id",
                    params![row.recipe_id],
                )?
                .into_iter()
                .map(|i| i.name)
                .collect();
            let include_ingredients: Vec<String> = wanted_names
                .iter()
                .filter(|name| recipe_names.contains(*name))
                .cloned()
                .collect();
            let not_include_ingredients = recipe_names
                .into_iter()
                .filter(|name| !include_ingredients.contains(name))
                .collect();
            recipes.push(RecommendedRecipe {
                recipe_id: row.recipe_id,
                nickname: row.nickname,
                title: row.title,
                include_ingredients,
                not_include_ingredients,
                likes: row.likes,
                bookmark: row.bookmarks,
                like_status: row.liked.into(),
                book_status: row.bookmarked.into(),
            });
        }
        Ok(Recommendations {
            ingredients: wanted_names,
            recipes,
        })
    }

    /// Overwrite the content of a recipe.
    ///
    /// Fields that are `None` keep their value. Ingredients are replaced wholesale.
    /// Step texts are rewritten by position: surviving positions keep their image,
    /// new positions have none, and positions past the end are removed.
    /// Returns the keys of step images that no longer belong to any step.
    pub fn apply_update(
        conn: &Connection,
        recipe_id: i64,
        title: Option<&str>,
        category: Option<Category>,
        intro: Option<&str>,
        ingredients: &[IngredientForUpload],
        steps: &[String],
    ) -> Result<Vec<String>> {
        let category: Option<&'static str> = category.map(Into::into);
        conn.execute(
            "UPDATE Recipe SET
                title = COALESCE(?2, title),
                category = COALESCE(?3, category),
                intro = COALESCE(?4, intro),
                updated_on = ?5
            WHERE recipe_id = ?1",
            params![recipe_id, title, category, intro, sqlite_current_timestamp()],
        )?;
        RecipeIngredient::replace_all(conn, recipe_id, ingredients)?;

        let existing: Vec<RecipeStep> = collect_rows(
            conn,
            "SELECT * FROM RecipeStep WHERE recipe_id = ? ORDER BY step_order",
            params![recipe_id],
        )?;
        for (text, position) in steps.iter().zip(1i64..) {
            match existing.iter().find(|s| s.step_order == position) {
                Some(step) => {
                    conn.execute(
                        "UPDATE RecipeStep SET step = ? WHERE step_id = ?",
                        params![text, step.step_id],
                    )?;
                }
                None => {
                    RecipeStep::insert(conn, recipe_id, position, text)?;
                }
            }
        }
        let kept = steps.len() as i64;
        conn.execute(
            "DELETE FROM RecipeStep WHERE recipe_id = ? AND step_order > ?",
            params![recipe_id, kept],
        )?;
        Ok(existing
            .into_iter()
            .filter(|s| s.step_order > kept)
            .filter_map(|s| s.image)
            .collect())
    }

    /// Delete a recipe and everything hanging off it.
    /// Returns the keys of the blobs it referenced, which the caller should delete.
    pub fn delete(db: &Database, recipe_id: i64) -> Result<Option<Vec<String>>> {
        let Some(recipe) = Self::get_by_id(db, recipe_id)? else {
            return Ok(None);
        };
        let mut keys: Vec<String> = recipe
            .get_steps(db)?
            .into_iter()
            .filter_map(|s| s.image)
            .collect();
        keys.extend(recipe.main_image);
        let conn = db.pool.get()?;
        conn.execute("DELETE FROM Recipe WHERE recipe_id = ?", params![recipe_id])?;
        Ok(Some(keys))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecipeStep {
    pub step_id: i64,
    pub recipe_id: i64,
    pub step_order: i64,
    pub step: String,
    pub image: Option<String>,
}

impl FromRow for RecipeStep {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            step_id: row.get("step_id")?,
            recipe_id: row.get("recipe_id")?,
            step_order: row.get("step_order")?,
            step: row.get("step")?,
            image: row.get("image")?,
        })
    }
}

impl RecipeStep {
    pub fn insert(conn: &Connection, recipe_id: i64, step_order: i64, step: &str) -> Result<i64> {
        conn.execute(
            "INSERT INTO RecipeStep (recipe_id, step_order, step) VALUES (?, ?, ?)",
            params![recipe_id, step_order, step],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_image(conn: &Connection, step_id: i64, key: &str) -> Result<()> {
        conn.execute(
            "UPDATE RecipeStep SET image = ? WHERE step_id = ?",
            params![key, step_id],
        )?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Ingredient {
    pub ingredient_id: i64,
    pub name: String,
}

impl FromRow for Ingredient {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            ingredient_id: row.get("ingredient_id")?,
            name: row.get("name")?,
        })
    }
}

impl Ingredient {
    /// Look an ingredient up by name, adding it to the catalogue if it is new
    pub fn find_or_create(conn: &Connection, name: &str) -> Result<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO Ingredient (name) VALUES (?)",
            params![name],
        )?;
        Ok(conn.query_row(
            "SELECT ingredient_id FROM Ingredient WHERE name = ?",
            params![name],
            |row| row.get(0),
        )?)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecipeIngredient {
    pub recipe_ingredient_id: i64,
    pub recipe_id: i64,
    pub ingredient_id: i64,
    pub name: String,
    pub quantity: String,
    pub unit: String,
}

impl FromRow for RecipeIngredient {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            recipe_ingredient_id: row.get("recipe_ingredient_id")?,
            recipe_id: row.get("recipe_id")?,
            ingredient_id: row.get("ingredient_id")?,
            name: row.get("name")?,
            quantity: row.get("quantity")?,
            unit: row.get("unit")?,
        })
    }
}

impl RecipeIngredient {
    /// Replace the ingredient list of a recipe. Blank names are skipped.
    pub fn replace_all(
        conn: &Connection,
        recipe_id: i64,
        ingredients: &[IngredientForUpload],
    ) -> Result<()> {
        conn.execute(
            "DELETE FROM RecipeIngredient WHERE recipe_id = ?",
            params![recipe_id],
        )?;
        for ingredient in ingredients {
            let name = ingredient.name.trim();
            if name.is_empty() {
                continue;
            }
            let ingredient_id = Ingredient::find_or_create(conn, name)?;
            conn.execute(
                "INSERT INTO RecipeIngredient (recipe_id, ingredient_id, quantity, unit)
                VALUES (?, ?, ?, ?)",
                params![recipe_id, ingredient_id, ingredient.quantity, ingredient.unit],
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub user_id: i64,
    pub nickname: Option<String>,
    pub profile_image: Option<String>,
    pub is_staff: bool,
}

impl FromRow for User {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get("user_id")?,
            nickname: row.get("nickname")?,
            profile_image: row.get("profile_image")?,
            is_staff: row.get("is_staff")?,
        })
    }
}

impl User {
    pub fn get_by_id(db: &Database, user_id: i64) -> Result<Option<Self>> {
        Ok(db
            .collect_rows("SELECT * FROM User WHERE user_id = ?", params![user_id])?
            .pop())
    }

    /// Users we have never heard of are not staff
    pub fn is_staff(db: &Database, user_id: i64) -> Result<bool> {
        Ok(Self::get_by_id(db, user_id)?.is_some_and(|u| u.is_staff))
    }

    /// Whether the user may edit or delete the recipe
    pub fn can_modify(db: &Database, user_id: i64, recipe: &Recipe) -> Result<bool> {
        Ok(recipe.user_id == user_id || Self::is_staff(db, user_id)?)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    pub comment_id: i64,
    pub recipe_id: i64,
    pub user_id: i64,
    pub comment: String,
    pub updated_on: String,
    pub nickname: Option<String>,
    pub profile_image: Option<String>,
}

impl FromRow for Comment {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            comment_id: row.get("comment_id")?,
            recipe_id: row.get("recipe_id")?,
            user_id: row.get("user_id")?,
            comment: row.get("comment")?,
            updated_on: row.get("updated_on")?,
            nickname: row.get("nickname")?,
            profile_image: row.get("profile_image")?,
        })
    }
}

impl Comment {
    pub fn push(db: &Database, recipe_id: i64, user_id: i64, comment: &str) -> Result<i64> {
        let conn = db.pool.get()?;
        conn.execute(
            "INSERT INTO Comment (recipe_id, user_id, comment, updated_on) VALUES (?, ?, ?, ?)",
            params![recipe_id, user_id, comment, sqlite_current_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Likes and bookmarks behave the same way, they just live in different tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Bookmark,
}

impl Reaction {
    fn table(self) -> &'static str {
        match self {
            Reaction::Like => "RecipeLike",
            Reaction::Bookmark => "Bookmark",
        }
    }

    /// Flip the user's reaction to a recipe and report where it ended up
    pub fn toggle(self, db: &Database, recipe_id: i64, user_id: i64) -> Result<Toggled> {
        let table = self.table();
        let mut conn = db.pool.get()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let existing: Option<i64> = tx
            .query_row(
                &format!("SELECT rowid FROM {table} WHERE recipe_id = ? AND user_id = ?"),
                params![recipe_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        let active = match existing {
            Some(rowid) => {
                tx.execute(&format!("DELETE FROM {table} WHERE rowid = ?"), params![rowid])?;
                false
            }
            None => {
                tx.execute(
                    &format!("INSERT INTO {table} (recipe_id, user_id) VALUES (?, ?)"),
                    params![recipe_id, user_id],
                )?;
                true
            }
        };
        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE recipe_id = ?"),
            params![recipe_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(Toggled {
            status: active.into(),
            count,
        })
    }
}

pub struct Interaction;

impl Interaction {
    /// Remember that a user opened a recipe
    pub fn record(db: &Database, user_id: i64, recipe_id: i64) -> Result<()> {
        let conn = db.pool.get()?;
        conn.execute(
            "INSERT INTO Interaction (user_id, recipe_id, created_on) VALUES (?, ?, ?)",
            params![user_id, recipe_id, sqlite_current_timestamp()],
        )?;
        Ok(())
    }

    pub fn recent_recipe_ids(db: &Database, user_id: i64, limit: i64) -> Result<Vec<i64>> {
        let conn = db.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT recipe_id, MAX(interaction_id) AS latest
            FROM Interaction
            WHERE user_id = ?
            GROUP BY recipe_id
            ORDER BY latest DESC
            LIMIT ?",
        )?;
        let ids = stmt
            .query_map(params![user_id, limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}
