mod common;

use anyhow::Result;
use common::{deposit, enroll_in_class, test_service, withdraw};
use tabungan::io::export::DatabaseSnapshot;
use tabungan::io::Exporter;

#[tokio::test]
async fn test_students_csv_has_one_row_per_student() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let siti = enroll_in_class(&service, "2024-001", "Siti Rahma", "7A").await?;
    enroll_in_class(&service, "2024-002", "Budi Santoso", "7B").await?;
    deposit(&service, &siti, 12345).await?;

    let exporter = Exporter::new(&service);
    let mut buffer = Vec::new();
    let count = exporter.export_students_csv(&mut buffer).await?;

    assert_eq!(count, 2);

    let csv = String::from_utf8(buffer)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "number,name,class,balance,enrolled_at");
    assert!(lines[1].starts_with("2024-001,Siti Rahma,7A,123.45,"));

    Ok(())
}

#[tokio::test]
async fn test_transactions_csv_is_in_admission_order() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let siti = enroll_in_class(&service, "2024-001", "Siti Rahma", "7A").await?;
    deposit(&service, &siti, 10000).await?;
    withdraw(&service, &siti, 4000).await?;

    let exporter = Exporter::new(&service);
    let mut buffer = Vec::new();
    let count = exporter.export_transactions_csv(&mut buffer).await?;

    assert_eq!(count, 2);

    let csv = String::from_utf8(buffer)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "sequence,created_at,student,kind,amount,description"
    );
    assert!(lines[1].starts_with("1,"));
    assert!(lines[1].contains(",deposit,100.00,"));
    assert!(lines[2].starts_with("2,"));
    assert!(lines[2].contains(",withdrawal,40.00,"));

    Ok(())
}

#[tokio::test]
async fn test_full_json_snapshot_round_trips() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let siti = enroll_in_class(&service, "2024-001", "Siti Rahma", "7A").await?;
    deposit(&service, &siti, 5000).await?;

    let exporter = Exporter::new(&service);
    let mut buffer = Vec::new();
    exporter.export_full_json(&mut buffer).await?;

    let snapshot: DatabaseSnapshot = serde_json::from_slice(&buffer)?;

    assert_eq!(snapshot.students.len(), 1);
    assert_eq!(snapshot.transactions.len(), 1);
    assert_eq!(snapshot.students[0].balance_cents, 5000);
    assert_eq!(snapshot.transactions[0].student_id, siti.id);

    Ok(())
}
