use anyhow::{Context, Result};
use bson::{Document, doc};
use futures::stream::TryStreamExt;
use mongodb::{Collection, Database, options::ReturnDocument};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use slug::slugify;

use crate::{
    ledger::store::{LedgerStore, StudentRemoval},
    models::{Course, ExamResult, FeeType, Payment, Student},
};

pub(super) const STUDENTS: &str = "students";
pub(super) const EXAM_RESULTS: &str = "exam_results";
pub(super) const PAYMENTS: &str = "payments";
pub(super) const COURSES: &str = "courses";
pub(super) const COUNTERS: &str = "counters";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub name: String,
    pub seq: i64,
}

/// MongoDB-backed store. The fee structure is embedded in the student
/// document, so every ledger write is a single-document update.
#[derive(Clone)]
pub struct MongoStore {
    pub students: Collection<Student>,
    pub results: Collection<ExamResult>,
    pub payments: Collection<Payment>,
    pub courses: Collection<Course>,
    pub counters: Collection<Counter>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        MongoStore {
            students: db.collection::<Student>(STUDENTS),
            results: db.collection::<ExamResult>(EXAM_RESULTS),
            payments: db.collection::<Payment>(PAYMENTS),
            courses: db.collection::<Course>(COURSES),
            counters: db.collection::<Counter>(COUNTERS),
        }
    }
}

async fn collect<T>(coll: &Collection<T>, filter: Document, sort: Document) -> Result<Vec<T>>
where
    T: DeserializeOwned + Send + Sync,
{
    let mut cursor = coll.find(filter).sort(sort).await?;
    let mut items = Vec::new();
    while let Some(item) = cursor.try_next().await? {
        items.push(item);
    }
    Ok(items)
}

fn by_student(student_id: Option<&str>) -> Document {
    match student_id {
        Some(id) => doc! { "student_id": id },
        None => doc! {},
    }
}

impl LedgerStore for MongoStore {
    async fn next_sequence(&self, name: &str) -> Result<i64> {
        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": name }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .with_context(|| format!("counter {name} upsert returned no document"))?;
        Ok(counter.seq)
    }

    async fn find_course(&self, name: &str) -> Result<Option<Course>> {
        self.courses
            .find_one(doc! { "slug": slugify(name) })
            .await
            .map_err(Into::into)
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        collect(&self.courses, doc! {}, doc! { "name": 1 }).await
    }

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        self.students
            .find_one(doc! { "student_id": student_id })
            .await
            .map_err(Into::into)
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        collect(&self.students, doc! {}, doc! { "student_id": 1 }).await
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        self.students
            .insert_one(student)
            .await
            .with_context(|| format!("inserting student {}", student.student_id))?;
        Ok(())
    }

    async fn replace_student(&self, student: &Student, expected_version: i64) -> Result<bool> {
        let next = Student {
            version: expected_version + 1,
            ..student.clone()
        };
        let res = self
            .students
            .replace_one(
                doc! { "student_id": &student.student_id, "version": expected_version },
                &next,
            )
            .await?;
        Ok(res.matched_count == 1)
    }

    async fn delete_student(&self, student_id: &str) -> Result<StudentRemoval> {
        let payments = self
            .payments
            .delete_many(doc! { "student_id": student_id })
            .await
            .with_context(|| format!("deleting payments of {student_id}"))?;
        let results = self
            .results
            .delete_many(doc! { "student_id": student_id })
            .await
            .with_context(|| format!("deleting results of {student_id}"))?;
        self.students
            .delete_one(doc! { "student_id": student_id })
            .await
            .with_context(|| format!("deleting student {student_id}"))?;
        Ok(StudentRemoval {
            results_removed: results.deleted_count,
            payments_removed: payments.deleted_count,
        })
    }

    async fn insert_result(&self, result: &ExamResult) -> Result<()> {
        self.results
            .insert_one(result)
            .await
            .with_context(|| format!("inserting result {}", result.id))?;
        Ok(())
    }

    async fn get_result(&self, id: &str) -> Result<Option<ExamResult>> {
        self.results
            .find_one(doc! { "id": id })
            .await
            .map_err(Into::into)
    }

    async fn find_result(&self, student_id: &str, semester: u32) -> Result<Option<ExamResult>> {
        self.results
            .find_one(doc! { "student_id": student_id, "semester": semester })
            .await
            .map_err(Into::into)
    }

    async fn list_results(&self, student_id: Option<&str>) -> Result<Vec<ExamResult>> {
        collect(
            &self.results,
            by_student(student_id),
            doc! { "student_id": 1, "semester": 1 },
        )
        .await
    }

    async fn replace_result(&self, result: &ExamResult) -> Result<bool> {
        let res = self
            .results
            .replace_one(doc! { "id": &result.id }, result)
            .await?;
        Ok(res.matched_count == 1)
    }

    async fn delete_result(&self, id: &str) -> Result<bool> {
        let res = self.results.delete_one(doc! { "id": id }).await?;
        Ok(res.deleted_count == 1)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.payments
            .insert_one(payment)
            .await
            .with_context(|| format!("inserting payment {}", payment.receipt_no))?;
        Ok(())
    }

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>> {
        self.payments
            .find_one(doc! { "id": id })
            .await
            .map_err(Into::into)
    }

    async fn list_payments(&self, student_id: Option<&str>) -> Result<Vec<Payment>> {
        collect(
            &self.payments,
            by_student(student_id),
            doc! { "payment_date": -1, "receipt_no": -1 },
        )
        .await
    }

    async fn delete_payment(&self, id: &str) -> Result<bool> {
        let res = self.payments.delete_one(doc! { "id": id }).await?;
        Ok(res.deleted_count == 1)
    }

    async fn flag_orphaned_payments(&self, result_id: &str) -> Result<u64> {
        let res = self
            .payments
            .update_many(
                doc! {
                    "fee_type": FeeType::BackSubject.as_str(),
                    "result_id": result_id,
                    "orphaned": { "$ne": true },
                },
                doc! { "$set": { "orphaned": true } },
            )
            .await?;
        Ok(res.modified_count)
    }
}
