use pretty_assertions::assert_eq;

use crate::{
    service::{UploadKind, UploadOutcome, UploadResponse},
    tests::{SALES_TSV, STYLES_TSV, seed_master_data, test_state},
};

async fn run_upload(state: &crate::service::State, kind: UploadKind, tsv: &str) -> UploadResponse {
    match state
        .pipeline()
        .run(kind, tsv.as_bytes(), None)
        .await
        .unwrap()
    {
        UploadOutcome::Done(response) => response,
        UploadOutcome::Cancelled => panic!("unexpected cancellation"),
    }
}

#[tokio::test]
async fn test_styles_header_mismatch_persists_nothing() {
    let state = test_state();
    // `gender` column missing.
    let tsv = "style\tbrand\tcategory\tsub_category\tmrp\nSTY1\tAcme\tShirts\tCasual\t499.99\n";
    let response = run_upload(&state, UploadKind::Styles, tsv).await;
    assert!(!response.success);
    assert!(response.message.contains("header mismatch"));
    assert_eq!(response.record_count, 0);
    assert!(state.store.list_styles().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_style_in_file_aborts_upload() {
    let state = test_state();
    let tsv = "style\tbrand\tcategory\tsub_category\tmrp\tgender\n\
         STY1\tAcme\tShirts\tCasual\t499.99\tMen\n\
         STY1\tAcme\tShirts\tFormal\t599.99\tMen\n";
    let response = run_upload(&state, UploadKind::Styles, tsv).await;
    assert!(!response.success);
    assert!(response.error_count >= 1);
    assert!(state.store.list_styles().await.unwrap().is_empty());
    let summary = response.error_summary.unwrap();
    assert_eq!(summary.counts["DUPLICATE_ERROR"], 1);
}

#[tokio::test]
async fn test_any_validation_error_persists_zero_rows() {
    let state = test_state();
    // Second row has an invalid mrp; the valid first row must not land.
    let tsv = "style\tbrand\tcategory\tsub_category\tmrp\tgender\n\
         STY1\tAcme\tShirts\tCasual\t499.99\tMen\n\
         STY2\tAcme\tShirts\tFormal\tcheap\tMen\n";
    let response = run_upload(&state, UploadKind::Styles, tsv).await;
    assert!(!response.success);
    assert_eq!(response.record_count, 0);
    assert!(state.store.list_styles().await.unwrap().is_empty());
    assert!(response.error_files.validation_errors.is_some());
}

#[tokio::test]
async fn test_master_upload_upserts_and_is_idempotent() {
    let state = test_state();
    let first = run_upload(&state, UploadKind::Styles, STYLES_TSV).await;
    assert!(first.success);
    assert_eq!(first.record_count, 2);
    assert_eq!(state.store.list_styles().await.unwrap().len(), 2);

    // Re-uploading the identical file changes nothing.
    let second = run_upload(&state, UploadKind::Styles, STYLES_TSV).await;
    assert!(second.success);
    assert_eq!(
        second.messages,
        vec!["Styles: 0 inserted, 0 updated, 2 unchanged".to_string()]
    );

    // A file covering only STY1 updates it and leaves STY2 alone.
    let update =
        "style\tbrand\tcategory\tsub_category\tmrp\tgender\nSTY1\tAcme\tShirts\tSport\t450.00\tMen\n";
    let third = run_upload(&state, UploadKind::Styles, update).await;
    assert!(third.success);
    let styles = state.store.list_styles().await.unwrap();
    assert_eq!(styles.len(), 2);
    let sty1 = styles.iter().find(|s| s.style_code == "STY1").unwrap();
    assert_eq!(sty1.sub_category, "Sport");
    assert!(styles.iter().any(|s| s.style_code == "STY2"));
}

#[tokio::test]
async fn test_sku_upload_resolves_style_case_insensitively() {
    let state = test_state();
    seed_master_data(&state).await;
    let skus = state.store.list_skus().await.unwrap();
    // `sty2` in the fixture resolved against the upper-cased master row.
    assert_eq!(skus.len(), 2);
    assert!(skus.iter().any(|s| s.sku == "SKU2"));
}

#[tokio::test]
async fn test_sku_with_unknown_style_is_skipped_not_fatal() {
    let state = test_state();
    seed_master_data(&state).await;
    let tsv = "sku\tstyle\tsize\nSKU9\tNOPE1\tM\nSKU8\tSTY1\tS\n";
    let response = run_upload(&state, UploadKind::Skus, tsv).await;
    assert!(response.success);
    assert_eq!(response.record_count, 1);
    assert_eq!(response.skipped_count, 1);
    assert!(response.error_files.skipped_rows.is_some());
    assert!(response.error_files.validation_errors.is_none());
}

#[tokio::test]
async fn test_sales_upload_replaces_previous_contents() {
    let state = test_state();
    seed_master_data(&state).await;

    let first = run_upload(&state, UploadKind::Sales, SALES_TSV).await;
    assert!(first.success);
    assert_eq!(first.record_count, 2);
    assert_eq!(state.store.count_sales().await.unwrap(), 2);

    // One row resolves, one references an unknown sku: the upload succeeds,
    // persists exactly input - skipped rows and the old table is gone.
    let second_tsv = "day\tsku\tchannel\tquantity\tdiscount\trevenue\n\
         2024-02-01\tSKU1\tSTORE1\t3\t0\t30\n\
         2024-02-01\tSKU9\tSTORE1\t4\t0\t40\n";
    let second = run_upload(&state, UploadKind::Sales, second_tsv).await;
    assert!(second.success);
    assert_eq!(second.record_count, 1);
    assert_eq!(second.skipped_count, 1);
    assert!(!second.warnings.is_empty());

    let sales = state.store.list_sales(None).await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(
        sales[0].day,
        chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    );
}

#[tokio::test]
async fn test_sales_validation_error_aborts_whole_upload() {
    let state = test_state();
    seed_master_data(&state).await;
    run_upload(&state, UploadKind::Sales, SALES_TSV).await;

    let bad = "day\tsku\tchannel\tquantity\tdiscount\trevenue\n\
         2024-03-01\tSKU1\tSTORE1\t0\t0\t10\n";
    let response = run_upload(&state, UploadKind::Sales, bad).await;
    assert!(!response.success);
    // The previous table contents survive an aborted upload.
    assert_eq!(state.store.count_sales().await.unwrap(), 2);
}

#[tokio::test]
async fn test_upload_audit_trail() {
    let state = test_state();
    run_upload(&state, UploadKind::Styles, STYLES_TSV).await;
    let audit = state.store.list_audit(10).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|e| e.entity_type == "style"));
    assert!(
        audit
            .iter()
            .any(|e| e.details == "New style created: STY1")
    );
}

#[tokio::test]
async fn test_styles_round_trip_through_download() {
    let state = test_state();
    run_upload(&state, UploadKind::Styles, STYLES_TSV).await;
    let rendered = state
        .downloads()
        .render(crate::service::DownloadKind::Styles, None)
        .await
        .unwrap();
    assert_eq!(rendered.rows, 2);
    assert!(rendered.content.starts_with("style\tbrand\tcategory\tsub_category\tmrp\tgender\n"));
    assert!(rendered.content.contains("STY1\tAcme\tShirts\tCasual\t499.99\tMen"));
    assert!(rendered.content.contains("STY2\tAcme\tShirts\tFormal\t599.99\tWomen"));
}
