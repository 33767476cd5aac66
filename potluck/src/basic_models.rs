use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Body of `POST /recipes/temp-image`.
///
/// Everything is optional so that a missing field is reported as a bad request
/// by the server rather than as a JSON rejection.
#[derive(Deserialize, Serialize, Clone, Default)]
pub struct TempImageForUpload {
    /// A data URI, e.g. `data:image/png;base64,iVBORw0...`
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub order: Option<i64>,
}

impl std::fmt::Debug for TempImageForUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempImageForUpload")
            .field("image", &self.image.as_ref().map(|i| i.len()))
            .field("kind", &self.kind)
            .field("order", &self.order)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngredientForUpload {
    pub name: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub unit: String,
}

/// Body of `POST /recipes`: the final field values of a draft being published.
/// A missing title or category arrives empty and is rejected by the server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecipeForUpload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub recipe_ingredients: Vec<IngredientForUpload>,
    /// Step texts in the order they should appear
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Body of `PUT /recipes`. `id`, `recipe_ingredients` and `steps` are required,
/// but they are checked by the server so the client gets a readable error.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RecipeUpdate {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub intro: Option<String>,
    pub recipe_ingredients: Option<Vec<IngredientForUpload>>,
    pub steps: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RecommendQuery {
    #[serde(default)]
    pub ingredients: Vec<i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommentForUpload {
    pub comment: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub id: i64,
    pub image_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    pub id: i64,
}

/// Whether the current user has liked or bookmarked something.
/// On the wire this is always `1` or `-1`, never `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Inactive,
}

impl From<bool> for Status {
    fn from(active: bool) -> Self {
        if active {
            Status::Active
        } else {
            Status::Inactive
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(match self {
            Status::Active => 1,
            Status::Inactive => -1,
        })
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i8::deserialize(deserializer)? {
            1 => Ok(Status::Active),
            -1 => Ok(Status::Inactive),
            other => Err(serde::de::Error::custom(format!(
                "status must be 1 or -1, got {other}"
            ))),
        }
    }
}

/// One entry in a category, search, recent or liked listing
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecipeSummary {
    pub id: i64,
    pub user: Option<String>,
    pub title: String,
    pub main_image: Option<String>,
    pub like: i64,
    pub like_status: Status,
    pub book: i64,
    pub book_status: Status,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecipeAuthor {
    pub id: i64,
    pub nickname: Option<String>,
    pub profile_image: Option<String>,
    pub date: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngredientLine {
    pub id: i64,
    pub ingredient_id: i64,
    pub name: String,
    pub quantity: String,
    pub unit: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StepLine {
    pub step: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommentLine {
    pub id: i64,
    pub user_id: i64,
    pub user_nickname: Option<String>,
    pub profile_image: Option<String>,
    pub updated_at: String,
    pub comment: String,
    pub can_update: u8,
}

/// Everything the recipe page needs in one payload
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecipeDetail {
    pub id: i64,
    pub can_update: u8,
    pub title: String,
    pub category: String,
    pub intro: Option<String>,
    pub main_image: Option<String>,
    pub created_on: String,
    pub like: i64,
    pub like_status: Status,
    pub book: i64,
    pub book_status: Status,
    pub user: RecipeAuthor,
    pub ingredients: Vec<IngredientLine>,
    pub steps: Vec<StepLine>,
    pub comments: Vec<CommentLine>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecommendedRecipe {
    pub recipe_id: i64,
    pub nickname: Option<String>,
    pub title: String,
    pub include_ingredients: Vec<String>,
    pub not_include_ingredients: Vec<String>,
    pub likes: i64,
    pub bookmark: i64,
    pub like_status: Status,
    pub book_status: Status,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Recommendations {
    pub ingredients: Vec<String>,
    pub recipes: Vec<RecommendedRecipe>,
}

/// Result of toggling a like or bookmark
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct Toggled {
    pub status: Status,
    pub count: i64,
}
