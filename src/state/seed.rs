use std::{fs, path::Path};

use anyhow::{Context, Result};
use bson::{Document, doc};
use mongodb::{Database, IndexModel, options::IndexOptions};
use serde::de::DeserializeOwned;
use slug::slugify;
use tracing::{info, warn};

use crate::models::Course;

use super::mongo::{COUNTERS, COURSES, EXAM_RESULTS, PAYMENTS, STUDENTS};

pub(super) fn load_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str::<Vec<T>>(&contents)
            .with_context(|| format!("parsing {}", path.display())),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "seed file not readable; skipping");
            Ok(Vec::new())
        }
    }
}

pub(super) async fn ensure_collections(db: &Database) -> Result<()> {
    let existing = db.list_collection_names().await?;
    for name in [STUDENTS, EXAM_RESULTS, PAYMENTS, COURSES, COUNTERS] {
        if !existing.iter().any(|n| n == name) {
            db.create_collection(name).await?;
        }
    }

    unique_index(db, STUDENTS, doc! { "student_id": 1 }, "student_id_unique").await?;
    unique_index(db, EXAM_RESULTS, doc! { "id": 1 }, "id_unique").await?;
    unique_index(
        db,
        EXAM_RESULTS,
        doc! { "student_id": 1, "semester": 1 },
        "student_semester_unique",
    )
    .await?;
    unique_index(db, PAYMENTS, doc! { "id": 1 }, "id_unique").await?;
    unique_index(db, PAYMENTS, doc! { "receipt_no": 1 }, "receipt_no_unique").await?;
    unique_index(db, COURSES, doc! { "slug": 1 }, "slug_unique").await?;
    Ok(())
}

async fn unique_index(db: &Database, collection: &str, keys: Document, name: &str) -> Result<()> {
    db.collection::<Document>(collection)
        .create_index(
            IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(name.to_string())
                        .build(),
                )
                .build(),
        )
        .await
        .with_context(|| format!("creating index {name} on {collection}"))?;
    Ok(())
}

/// Loads the course catalog from `path` when the courses collection is empty.
pub(super) async fn seed_courses(db: &Database, path: &Path) -> Result<usize> {
    let coll = db.collection::<Course>(COURSES);
    if coll.estimated_document_count().await? > 0 {
        return Ok(0);
    }

    let courses: Vec<Course> = load_json_array::<Course>(path)?
        .into_iter()
        .map(|mut course| {
            if course.slug.is_empty() {
                course.slug = slugify(&course.name);
            }
            course
        })
        .collect();
    if courses.is_empty() {
        return Ok(0);
    }

    coll.insert_many(&courses).await?;
    info!(count = courses.len(), path = %path.display(), "course catalog seeded");
    Ok(courses.len())
}
