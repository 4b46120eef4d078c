#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use coachdesk::{
    ledger::{LedgerError, LedgerStore, RecordPayment},
    models::{FeeStatus, FeeType, SubjectOutcome::*},
};

#[tokio::test]
async fn payment_is_credited_and_receipted() {
    let store = common::memory_store();
    let ledger = common::reconciler(&store);
    let student = ledger.create_student(common::new_student("Indu")).await.unwrap();
    assert_eq!(student.student_id, "STU20260001");
    assert_eq!(student.fee_structure.installment_amount, 5_000.0);

    let receipt = ledger
        .record_payment(RecordPayment {
            installment_number: Some(1),
            remarks: Some("  first installment ".into()),
            ..common::payment(&student, 5_200.0, 200.0)
        })
        .await
        .unwrap();
    assert_eq!(receipt.payment.receipt_no, "RCP2026030100001");
    assert_eq!(receipt.payment.final_amount, 5_000.0);
    assert_eq!(receipt.payment.remarks.as_deref(), Some("first installment"));
    assert_eq!(receipt.total_paid, 5_000.0);
    assert_eq!(receipt.remaining_amount, 5_000.0);
    assert_eq!(receipt.payment.allocations.len(), 1);
    assert_eq!(receipt.payment.allocations[0].semester_number, 1);

    let stored = ledger.student(&student.student_id).await.unwrap();
    assert_eq!(stored.fee_structure.fee_status(), FeeStatus::Partial);
    assert_eq!(stored.fee_structure.semester_fees[0].remaining_amount, 0.0);

    let second = ledger
        .record_payment(common::payment(&student, 100.0, 0.0))
        .await
        .unwrap();
    assert_eq!(second.payment.receipt_no, "RCP2026030100002");
}

#[tokio::test]
async fn deleting_a_payment_reverses_it() {
    let store = common::memory_store();
    let ledger = common::reconciler(&store);
    let student = ledger.create_student(common::new_student("Jai")).await.unwrap();

    ledger
        .record_payment(common::payment(&student, 3_000.0, 0.0))
        .await
        .unwrap();
    let before = ledger.student(&student.student_id).await.unwrap();
    let receipt = ledger
        .record_payment(common::payment(&student, 4_000.0, 0.0))
        .await
        .unwrap();
    assert_eq!(receipt.payment.allocations.len(), 2);

    let fees = ledger.delete_payment(&receipt.payment.id).await.unwrap();
    assert_eq!(fees, before.fee_structure);
    assert!(store.get_payment(&receipt.payment.id).await.unwrap().is_none());

    assert!(matches!(
        ledger.delete_payment(&receipt.payment.id).await,
        Err(LedgerError::NotFound { entity: "payment", .. })
    ));
}

#[tokio::test]
async fn overpayment_is_kept_and_reversed_exactly() {
    let store = common::memory_store();
    let ledger = common::reconciler(&store);
    let student = ledger.create_student(common::new_student("Kavya")).await.unwrap();

    ledger
        .record_payment(common::payment(&student, 9_000.0, 0.0))
        .await
        .unwrap();
    let receipt = ledger
        .record_payment(common::payment(&student, 2_000.0, 0.0))
        .await
        .unwrap();
    assert_eq!(receipt.remaining_amount, -1_000.0);

    let stored = ledger.student(&student.student_id).await.unwrap();
    assert_eq!(stored.fee_structure.outstanding(), 0.0);
    assert_eq!(stored.fee_structure.fee_status(), FeeStatus::Paid);

    let fees = ledger.delete_payment(&receipt.payment.id).await.unwrap();
    assert_eq!(fees.total_paid, 9_000.0);
    assert_eq!(fees.semester_fees[1].paid_amount, 4_000.0);
    assert!(fees.is_consistent());
}

#[tokio::test]
async fn concurrent_payments_for_one_student_both_count() {
    let store = common::memory_store();
    let ledger = Arc::new(common::reconciler(&store));
    let student = ledger.create_student(common::new_student("Lalit")).await.unwrap();

    let (a, b) = tokio::join!(
        ledger.record_payment(common::payment(&student, 1_500.0, 0.0)),
        ledger.record_payment(common::payment(&student, 2_500.0, 0.0)),
    );
    a.unwrap();
    b.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = Arc::clone(&ledger);
        let req = common::payment(&student, 250.0, 0.0);
        handles.push(tokio::spawn(async move { ledger.record_payment(req).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = ledger.student(&student.student_id).await.unwrap();
    assert_eq!(stored.fee_structure.total_paid, 6_000.0);
    assert_eq!(stored.fee_structure.remaining_amount, 4_000.0);
    assert!(stored.fee_structure.is_consistent());
    assert_eq!(
        store
            .list_payments(Some(&student.student_id))
            .await
            .unwrap()
            .len(),
        10
    );
}

#[tokio::test]
async fn payment_during_result_publication_is_not_lost() {
    let store = common::memory_store();
    let ledger = common::reconciler(&store);
    let student = ledger.create_student(common::new_student("Mira")).await.unwrap();

    let (paid, published) = tokio::join!(
        ledger.record_payment(common::payment(&student, 2_000.0, 0.0)),
        ledger.publish_result(common::publish(&student, 1, &[Fail, Fail, Pass])),
    );
    paid.unwrap();
    published.unwrap();

    let stored = ledger.student(&student.student_id).await.unwrap();
    assert_eq!(stored.fee_structure.total_course_fee, 11_000.0);
    assert_eq!(stored.fee_structure.total_paid, 2_000.0);
    assert_eq!(stored.fee_structure.remaining_amount, 9_000.0);
}

#[tokio::test]
async fn invalid_payments_are_rejected_without_side_effects() {
    let store = common::memory_store();
    let ledger = common::reconciler(&store);
    let student = ledger.create_student(common::new_student("Nikhil")).await.unwrap();

    let cases = [
        common::payment(&student, 0.0, 0.0),
        common::payment(&student, -10.0, 0.0),
        common::payment(&student, 100.0, 150.0),
        common::payment(&student, 100.0, -5.0),
        RecordPayment {
            installment_number: Some(3),
            ..common::payment(&student, 100.0, 0.0)
        },
        RecordPayment {
            installment_number: Some(0),
            ..common::payment(&student, 100.0, 0.0)
        },
        RecordPayment {
            fee_type: FeeType::BackSubject,
            ..common::payment(&student, 500.0, 0.0)
        },
    ];
    for req in cases {
        let err = ledger.record_payment(req).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }), "{err:?}");
    }

    let unknown = RecordPayment {
        student_id: "STU20269999".into(),
        ..common::payment(&student, 100.0, 0.0)
    };
    assert!(matches!(
        ledger.record_payment(unknown).await,
        Err(LedgerError::NotFound { entity: "student", .. })
    ));

    let stored = ledger.student(&student.student_id).await.unwrap();
    assert_eq!(stored.fee_structure, student.fee_structure);
    assert!(store.list_payments(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn back_subject_payment_must_match_the_result() {
    let store = common::memory_store();
    let ledger = common::reconciler(&store);
    let student = ledger.create_student(common::new_student("Om")).await.unwrap();
    let other = ledger.create_student(common::new_student("Pia")).await.unwrap();

    let outcome = ledger
        .publish_result(common::publish(&student, 1, &[Fail, Pass]))
        .await
        .unwrap();
    let back_subject = |student_id: &str, code: &str| RecordPayment {
        student_id: student_id.to_string(),
        fee_type: FeeType::BackSubject,
        back_subjects: vec![code.to_string()],
        result_id: Some(outcome.result_id.clone()),
        ..common::payment(&student, 500.0, 0.0)
    };

    let err = ledger
        .record_payment(back_subject(&student.student_id, "PGDCA102"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "back_subjects"));

    let err = ledger
        .record_payment(back_subject(&other.student_id, "PGDCA101"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "result_id"));

    let receipt = ledger
        .record_payment(back_subject(&student.student_id, "PGDCA101"))
        .await
        .unwrap();
    assert_eq!(receipt.payment.fee_type, FeeType::BackSubject);
    assert_eq!(receipt.remaining_amount, 10_000.0);
}
