//! Turning a draft into a published recipe.
//!
//! All database writes happen in one transaction. Images are copied out of
//! staging as we go, and if anything fails the copies are deleted again before
//! the transaction is rolled back, so a failed publish leaves nothing behind.

use anyhow::Context;
use itertools::{EitherOrBoth, Itertools};
use potluck::basic_models::RecipeForUpload;
use rusqlite::{Connection, TransactionBehavior};

use crate::database::Database;
use crate::drafts::{Draft, DraftStepImage};
use crate::errors::WebError;
use crate::models::{Category, Recipe, RecipeIngredient, RecipeStep};
use crate::storage::{recipe_key, BlobStore};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("no open draft")]
    NoOpenDraft,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Failed to publish recipe: {0}")]
    Failed(String),
}

impl From<PublishError> for WebError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::NoOpenDraft => WebError::NotFound(PublishError::NoOpenDraft.to_string()),
            PublishError::InvalidInput(msg) => WebError::InvalidInput(msg),
            PublishError::Failed(_) => WebError::Publish(e.to_string()),
        }
    }
}

fn failed(e: impl std::fmt::Display) -> PublishError {
    PublishError::Failed(format!("{e:#}"))
}

/// A submitted step and the staged image that was uploaded for its position, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep<'a> {
    pub position: i64,
    pub text: &'a str,
    pub image: Option<&'a DraftStepImage>,
}

/// Pair step texts (positions 1, 2, ...) with staged images by position.
///
/// Images are bound to the position they were uploaded for, not to an index in the
/// final list. Positions without an image get none; images whose position no longer
/// exists come back in the second list.
///
/// `images` must be sorted by `step_order` with no repeats, which the unique
/// `(draft_id, step_order)` constraint and [`Draft::step_images`] guarantee.
pub fn pair_steps_with_images<'a>(
    steps: &'a [String],
    images: &'a [DraftStepImage],
) -> (Vec<PlannedStep<'a>>, Vec<&'a DraftStepImage>) {
    let mut planned = Vec::with_capacity(steps.len());
    let mut orphans = vec![];
    let positioned = steps.iter().zip(1i64..);
    for pair in positioned.merge_join_by(images, |(_, position), image| {
        position.cmp(&image.step_order)
    }) {
        match pair {
            EitherOrBoth::Both((text, position), image) => planned.push(PlannedStep {
                position,
                text,
                image: Some(image),
            }),
            EitherOrBoth::Left((text, position)) => planned.push(PlannedStep {
                position,
                text,
                image: None,
            }),
            EitherOrBoth::Right(image) => orphans.push(image),
        }
    }
    (planned, orphans)
}

pub struct Publisher<'a> {
    db: &'a Database,
    blobs: &'a dyn BlobStore,
    bucket_root: &'a str,
}

impl<'a> Publisher<'a> {
    pub fn new(db: &'a Database, blobs: &'a dyn BlobStore, bucket_root: &'a str) -> Self {
        Self {
            db,
            blobs,
            bucket_root,
        }
    }

    /// Publish the user's open draft as a recipe with the submitted contents.
    /// Returns the new recipe's id.
    pub fn publish(&self, user_id: i64, upload: &RecipeForUpload) -> Result<i64, PublishError> {
        let title = upload.title.trim();
        if title.is_empty() {
            return Err(PublishError::InvalidInput("Title is required".into()));
        }
        if upload.category.trim().is_empty() {
            return Err(PublishError::InvalidInput("Category is required".into()));
        }
        let category: Category = upload
            .category
            .trim()
            .parse()
            .map_err(|_| PublishError::InvalidInput(format!("Unknown category: {}", upload.category)))?;

        let mut conn = self.db.pool.get().map_err(failed)?;
        // Take the write lock up front so two publishes from one user cannot interleave.
        // It is held until commit, image copies included.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(failed)?;
        let draft = Draft::find_open(&tx, user_id)
            .map_err(failed)?
            .ok_or(PublishError::NoOpenDraft)?;

        let mut relocated = vec![];
        let outcome = self
            .promote(&tx, &draft, title, category, upload, &mut relocated)
            .and_then(|recipe_id| {
                tx.commit().context("Committing recipe")?;
                Ok(recipe_id)
            });
        match outcome {
            Ok(recipe_id) => {
                tracing::info!(
                    user_id,
                    draft_id = draft.draft_id,
                    recipe_id,
                    images = relocated.len(),
                    "Published recipe"
                );
                Ok(recipe_id)
            }
            Err(e) => {
                // The transaction rolls back when it is dropped; the copies need undoing by hand
                tracing::error!(user_id, draft_id = draft.draft_id, "Publishing failed: {:#}", e);
                self.discard(&relocated);
                Err(failed(e))
            }
        }
    }

    fn promote(
        &self,
        tx: &Connection,
        draft: &Draft,
        title: &str,
        category: Category,
        upload: &RecipeForUpload,
        relocated: &mut Vec<String>,
    ) -> anyhow::Result<i64> {
        let recipe_id = Recipe::insert(tx, draft.user_id, title, category, upload.intro.as_deref())?;
        RecipeIngredient::replace_all(tx, recipe_id, &upload.recipe_ingredients)?;
        Draft::link_recipe(tx, draft.draft_id, recipe_id)?;

        if let Some(staged) = &draft.main_image {
            let key = self.relocate(recipe_id, staged, relocated)?;
            Recipe::set_main_image(tx, recipe_id, &key)?;
        }

        let images = Draft::step_images(tx, draft.draft_id)?;
        let (planned, orphans) = pair_steps_with_images(&upload.steps, &images);
        if !orphans.is_empty() {
            tracing::info!(
                draft_id = draft.draft_id,
                orders = ?orphans.iter().map(|i| i.step_order).collect::<Vec<_>>(),
                "Staged step images without a matching step are left in staging"
            );
        }
        for step in planned {
            let step_id = RecipeStep::insert(tx, recipe_id, step.position, step.text)?;
            if let Some(image) = step.image {
                let key = self.relocate(recipe_id, &image.image, relocated)?;
                RecipeStep::set_image(tx, step_id, &key)?;
            }
        }

        Draft::close(tx, draft.draft_id)?;
        Ok(recipe_id)
    }

    /// Copy a staged blob to its permanent home and remember that we did
    fn relocate(
        &self,
        recipe_id: i64,
        staged: &str,
        relocated: &mut Vec<String>,
    ) -> anyhow::Result<String> {
        let key = recipe_key(self.bucket_root, recipe_id, staged);
        self.blobs
            .copy(staged, &key)
            .with_context(|| format!("Relocating {staged}"))?;
        relocated.push(key.clone());
        Ok(key)
    }

    /// Best-effort removal of blobs copied during a publish that did not commit
    fn discard(&self, relocated: &[String]) {
        for key in relocated {
            if let Err(e) = self.blobs.delete(key) {
                tracing::warn!("Could not remove {} after failed publish: {:#}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(orders: &[i64]) -> Vec<DraftStepImage> {
        orders
            .iter()
            .map(|&order| DraftStepImage {
                draft_step_image_id: order * 10,
                draft_id: 1,
                step_order: order,
                image: format!("media/temp/1/step_{order}.png"),
            })
            .collect()
    }

    fn steps(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    fn orders_with_images(planned: &[PlannedStep]) -> Vec<(i64, Option<i64>)> {
        planned
            .iter()
            .map(|p| (p.position, p.image.map(|i| i.step_order)))
            .collect()
    }

    #[test]
    fn gaps_leave_steps_without_images() {
        let steps = steps(&["a", "b", "c"]);
        let images = staged(&[1, 3]);
        let (planned, orphans) = pair_steps_with_images(&steps, &images);
        assert_eq!(
            orders_with_images(&planned),
            vec![(1, Some(1)), (2, None), (3, Some(3))]
        );
        assert_eq!(planned[1].text, "b");
        assert!(orphans.is_empty());
    }

    #[test]
    fn extra_images_are_orphaned() {
        let steps = steps(&["a", "b"]);
        let images = staged(&[1, 2, 3, 4]);
        let (planned, orphans) = pair_steps_with_images(&steps, &images);
        assert_eq!(orders_with_images(&planned), vec![(1, Some(1)), (2, Some(2))]);
        assert_eq!(
            orphans.iter().map(|i| i.step_order).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[test]
    fn trailing_steps_have_no_images() {
        let steps = steps(&["a", "b", "c", "d"]);
        let images = staged(&[2]);
        let (planned, orphans) = pair_steps_with_images(&steps, &images);
        assert_eq!(
            orders_with_images(&planned),
            vec![(1, None), (2, Some(2)), (3, None), (4, None)]
        );
        assert!(orphans.is_empty());
    }

    #[test]
    fn no_steps_orphans_everything() {
        let images = staged(&[1, 2]);
        let (planned, orphans) = pair_steps_with_images(&[], &images);
        assert!(planned.is_empty());
        assert_eq!(orphans.len(), 2);
    }

    #[test]
    fn failures_keep_their_message() {
        let web: WebError = failed(anyhow::anyhow!("bucket is gone")).into();
        assert_eq!(web.to_string(), "Failed to publish recipe: bucket is gone");
        assert_eq!(web.status(), 500);
    }
}
